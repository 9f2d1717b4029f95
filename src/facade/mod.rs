pub mod database;

pub use database::ClusterDatabase;
