pub mod model;
pub mod snowflake;
