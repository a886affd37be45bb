#[macro_use]
pub mod optim;

#[macro_use]
pub mod phoenix_tls;

mod frw_lock;
mod gc;

pub mod epoch;
pub mod thread;
