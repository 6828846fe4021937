mod balance;
mod expense;
mod integrity;
mod money;
mod participant;
mod payment;
mod settlement;
mod split;
mod trip;

pub use balance::*;
pub use expense::*;
pub use integrity::*;
pub use money::*;
pub use participant::*;
pub use payment::*;
pub use settlement::*;
pub use split::*;
pub use trip::*;
