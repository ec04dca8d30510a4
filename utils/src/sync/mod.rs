pub mod backpressure;
