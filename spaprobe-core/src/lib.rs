pub mod crawl;
pub mod diagnose;
pub mod report;
pub mod views;
