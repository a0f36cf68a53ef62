//! Tile-based station atmospherics: per-tile gas mixtures diffusing across
//! a grid, pipe networks holding one shared mixture per connected run, and
//! the vents, scrubbers, and thermal machinery moving gas between the two,
//! all driven on a fixed timestep.
//!
//! The simulation is deliberately single-owner: every mixture belongs to
//! exactly one tile arena or pipe network, machines hold handles rather
//! than references, and one tick never mutates the same grid from two
//! places. Independent grids fan out across rayon.

pub mod gas;

pub mod machines;

pub mod parser;

pub mod pipes;

pub mod prototypes;

pub mod simulation;

pub mod tiles;

pub use gas::{ambient_mixture, Mixture};
pub use machines::{tick_machine, Machine, MachineKind};
pub use pipes::{PipeId, PipeNet};
pub use simulation::{GridSim, MachineId, Simulation};
pub use tiles::{AirSeed, GridAtmosphere, TileAtmosphere, TileCoord};
