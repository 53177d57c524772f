pub mod retrieve_context;
pub mod web_search;

pub use retrieve_context::RetrieveContextTool;
pub use web_search::WebSearchTool;
