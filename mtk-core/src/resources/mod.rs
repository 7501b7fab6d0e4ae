//! Bus slaves of the SoC: main memory and the program-buffer window.

pub mod progbuf;
pub mod ram;
