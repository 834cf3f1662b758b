pub mod limits;
pub mod run;
pub mod status;
pub mod utils;
