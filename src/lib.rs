pub mod batch;
pub mod config;
pub mod humanize;
pub mod observability;
pub mod pipeline;
pub mod portal;
pub mod products;
pub mod report;
pub mod useragent;
