// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    ConfigOverrides, expand_path, load_config, load_urls_from_file, load_urls_from_source,
    output_path_for, parse_url_line,
};

// Re-export crawl functionality from spaprobe-core
pub use spaprobe_core::crawl::{CrawlOptions, CrawlProgressCallback, execute_crawl, extract_url_path};
