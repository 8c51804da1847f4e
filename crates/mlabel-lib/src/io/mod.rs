pub mod labels;
pub mod series;
