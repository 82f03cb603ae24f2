pub mod capture;
pub mod change_sets;
pub mod cycle;
pub mod dispatch;
pub mod history;
pub mod records;
pub mod run;
pub mod shared;
pub mod status;
