pub mod api;
pub mod cddrive;
pub mod cpu;
pub mod graphics;
pub mod irq;
mod macros;
pub mod memory;
pub mod rf5c164;
pub mod scheduler;
pub mod timer;

pub use api::{DiscSpeed, Mcd, McdConfig, McdError, McdResult, SUB_CPU_FREQUENCY};
pub use cddrive::Disc;
pub use cpu::{BusInterface, MainCpu, SubCpu};
pub use scheduler::Scheduler;
