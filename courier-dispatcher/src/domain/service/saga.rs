//! 存储事务 + Broker 事务组成的 saga
//!
//! 每一侧对应一个补偿步骤，补偿只对已开启的一侧执行，顺序固定为
//! 先中止 Broker 事务、再回滚存储事务。

use std::sync::Arc;

use courier_core::error::{CourierError, ErrorBuilder, ErrorCode, Result};
use courier_core::metrics::DispatcherMetrics;
use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::repository::{BrokerCommit, BrokerTransaction, StorageTransaction};

pub struct DispatchSaga {
    storage: Option<Box<dyn StorageTransaction>>,
    broker: Option<Box<dyn BrokerTransaction>>,
    metrics: Arc<DispatcherMetrics>,
}

impl DispatchSaga {
    pub fn new(metrics: Arc<DispatcherMetrics>) -> Self {
        Self {
            storage: None,
            broker: None,
            metrics,
        }
    }

    pub fn storage_started(&mut self, transaction: Box<dyn StorageTransaction>) {
        self.storage = Some(transaction);
    }

    pub fn broker_started(&mut self, transaction: Box<dyn BrokerTransaction>) {
        self.broker = Some(transaction);
    }

    pub fn storage(&mut self) -> Result<&mut (dyn StorageTransaction + 'static)> {
        self.storage
            .as_deref_mut()
            .ok_or_else(|| CourierError::internal("storage transaction not started"))
    }

    pub fn broker(&mut self) -> Result<&mut (dyn BrokerTransaction + 'static)> {
        self.broker
            .as_deref_mut()
            .ok_or_else(|| CourierError::internal("broker transaction not started"))
    }

    /// 先提交 Broker 事务，再提交存储事务
    ///
    /// 提交阶段不受写入截止时间约束：Broker 提交自带事务超时，
    /// Broker 一旦提交，存储提交必须等到结果。
    /// Broker 提交失败时回滚存储事务；Broker 已提交（或结果未知）而存储未持久化时
    /// 记录错误日志与不一致指标。
    pub async fn commit(mut self, ids: &[Uuid]) -> Result<()> {
        if let Some(broker) = self.broker.take() {
            match broker.commit().await {
                Ok(BrokerCommit::Committed) => {}
                Ok(BrokerCommit::OutcomeUnknown(err)) => {
                    self.metrics.dispatch_inconsistent_total.inc();
                    error!(
                        message_ids = ?ids,
                        error = %err,
                        "broker commit outcome unknown; rolling back storage, messages may have been announced"
                    );
                    self.compensate().await;
                    return Err(ErrorBuilder::new(ErrorCode::Broker, "broker commit outcome unknown")
                        .details(format!(
                            "messages may have been published but were not persisted: {}",
                            err.reason()
                        ))
                        .source(err)
                        .build_error());
                }
                Err(err) => {
                    self.compensate().await;
                    return Err(err);
                }
            }
        }

        let Some(storage) = self.storage.take() else {
            return Ok(());
        };

        storage.commit().await.map_err(|err| {
            self.metrics.dispatch_inconsistent_total.inc();
            error!(
                message_ids = ?ids,
                error = %err,
                "broker transaction committed but storage commit failed; messages announced without being persisted"
            );
            ErrorBuilder::new(
                ErrorCode::ConflictOrStorage,
                "storage commit failed after broker commit",
            )
            .details(format!(
                "messages were published but not persisted: {}",
                err.reason()
            ))
            .source(err)
            .build_error()
        })
    }

    /// 执行补偿：中止 Broker 事务（若已开启），再回滚存储事务（若已开启）
    ///
    /// 补偿失败只记录日志，不覆盖原始错误。
    pub async fn compensate(mut self) {
        if let Some(broker) = self.broker.take() {
            if let Err(err) = broker.abort().await {
                self.metrics
                    .compensation_failures_total
                    .with_label_values(&["broker_abort"])
                    .inc();
                warn!(error = %err, "failed to abort broker transaction during compensation");
            }
        }

        if let Some(storage) = self.storage.take() {
            if let Err(err) = storage.rollback().await {
                self.metrics
                    .compensation_failures_total
                    .with_label_values(&["storage_rollback"])
                    .inc();
                warn!(error = %err, "failed to roll back storage transaction during compensation");
            }
        }
    }
}

pub(crate) fn transaction_timed_out() -> CourierError {
    CourierError::broker("transaction timed out")
}
