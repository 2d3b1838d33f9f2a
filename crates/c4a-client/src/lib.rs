pub mod crawler;
pub mod executor;

pub use crawler::Crawler;
pub use executor::ReqwestExecutor;
