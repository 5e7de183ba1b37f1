pub mod adaptive;
pub mod aggregator;
pub mod coordinator;
pub mod dashboard;
pub mod recommender;
pub mod trend;

mod facade;

pub use facade::AnalyticsEngine;
