pub mod compare;
pub mod report;
pub mod series;
pub mod ui;
