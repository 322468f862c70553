pub mod utils;

mod sync;
