pub mod boxedarray;
pub mod num;
pub mod timing;

pub use boxedarray::BoxedByteArray;
pub use timing::TimingMode;
