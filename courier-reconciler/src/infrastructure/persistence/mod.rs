pub mod postgres_status_repo;

pub use postgres_status_repo::PostgresMessageStatusRepository;
