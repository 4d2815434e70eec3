pub mod decode;
pub mod encode;
pub mod query;
pub mod run;
pub mod validate;
