pub mod catalog;
pub mod datum;
pub mod executor;
pub mod expr;
pub mod index;
pub mod planner;
pub mod storage;
pub mod tuple;
