pub mod observer;

pub use observer::{ObserverEvaluator, ObserverView};
