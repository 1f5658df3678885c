pub mod chain_file;
pub mod checkpoint;
pub mod coordination;
pub mod error;
pub mod likelihood;
pub mod metropolis_hastings;
pub mod params;
pub mod proposal;
pub mod stats;
