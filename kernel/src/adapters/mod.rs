// Front-end adapters over the shared command log.

pub mod device;
pub mod socket;
