pub mod bbox;
pub mod catalog;
pub mod config;
pub mod error;
pub mod output;
pub mod request;
pub mod stations;
pub mod subset;
pub mod tables;
pub mod timewindow;
