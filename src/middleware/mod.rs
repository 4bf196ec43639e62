pub mod call_limit;

pub use call_limit::call_limit_middleware;
