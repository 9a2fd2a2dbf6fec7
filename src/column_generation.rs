pub mod column_pool;
pub mod driver;
pub mod greedy;
pub mod master;
pub mod pricing;
pub mod verification;
