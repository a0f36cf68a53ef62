use eyre::{ensure, Result};
use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use rayon::prelude::*;

use crate::machines::{tick_machine, Machine};
use crate::pipes::PipeNet;
use crate::tiles::GridAtmosphere;

/// Stable handle to one machine within its grid.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachineId(u32);

/// Everything atmospheric belonging to one station grid: the tile arena,
/// the pipe arena, and the machines bridging the two. One `GridSim` has one
/// owner per tick; grids never share tiles or pipes.
pub struct GridSim {
	pub atmos: GridAtmosphere,
	pub pipes: PipeNet,
	machines: IndexMap<MachineId, Machine, FxBuildHasher>,
	next_machine: u32,
}

impl GridSim {
	pub fn new(atmos: GridAtmosphere) -> Self {
		Self {
			atmos,
			pipes: PipeNet::new(),
			machines: Default::default(),
			next_machine: 0,
		}
	}

	/// Registers a machine. Machines run in creation order, every tick, for
	/// as long as they exist.
	pub fn add_machine(&mut self, machine: Machine) -> MachineId {
		let id = MachineId(self.next_machine);
		self.next_machine += 1;
		self.machines.insert(id, machine);
		id
	}

	/// Unregisters a machine (its structure was dismantled). The rest keep
	/// their creation order.
	pub fn remove_machine(&mut self, id: MachineId) -> Option<Machine> {
		self.machines.shift_remove(&id)
	}

	pub fn machine(&self, id: MachineId) -> Option<&Machine> {
		self.machines.get(&id)
	}

	/// Mutable access for gameplay toggles (enable, direction, bounds).
	/// Changes simply apply from the next tick on.
	pub fn machine_mut(&mut self, id: MachineId) -> Option<&mut Machine> {
		self.machines.get_mut(&id)
	}

	pub fn machine_count(&self) -> usize {
		self.machines.len()
	}

	/// One full tick for this grid: flush the invalidation queue, settle the
	/// tiles, then run every machine in creation order against the settled
	/// state. No machine sees another machine's mid-tick output through
	/// anything but the shared tiles and pipes themselves.
	pub fn tick(&mut self) {
		self.atmos.revalidate();
		self.atmos.process_active_tiles();
		for machine in self.machines.values() {
			tick_machine(machine, &mut self.atmos, &mut self.pipes);
		}
	}
}

/// The fixed-timestep driver over every grid. Grids are mutually
/// independent, so the tick fans them out across rayon; everything within
/// one grid stays on a single worker.
pub struct Simulation {
	grids: Vec<GridSim>,
	tick_period: f32,
	accumulator: f32,
	update_counter: u64,
}

impl Simulation {
	/// A simulation running at the given ticks per second.
	/// # Errors
	/// If the rate is non-positive or non-finite.
	pub fn new(tick_rate: f32) -> Result<Self> {
		ensure!(
			tick_rate.is_finite() && tick_rate > 0.0,
			"simulation with invalid tick rate {tick_rate}"
		);
		Ok(Self {
			grids: Vec::new(),
			tick_period: 1.0 / tick_rate,
			accumulator: 0.0,
			update_counter: 0,
		})
	}

	pub fn add_grid(&mut self, grid: GridSim) -> usize {
		self.grids.push(grid);
		self.grids.len() - 1
	}

	pub fn grid(&self, index: usize) -> Option<&GridSim> {
		self.grids.get(index)
	}

	pub fn grid_mut(&mut self, index: usize) -> Option<&mut GridSim> {
		self.grids.get_mut(index)
	}

	pub fn grid_count(&self) -> usize {
		self.grids.len()
	}

	/// How many ticks have completed since startup.
	pub fn update_counter(&self) -> u64 {
		self.update_counter
	}

	/// Feeds wall time into the accumulator and runs however many whole
	/// fixed ticks fit. Lost frame time carries over rather than stretching
	/// the timestep.
	pub fn update(&mut self, frame_time: f32) {
		if frame_time.is_finite() && frame_time > 0.0 {
			self.accumulator += frame_time;
		}
		while self.accumulator >= self.tick_period {
			self.accumulator -= self.tick_period;
			self.tick();
		}
	}

	/// One synchronous simulation step over every grid.
	pub fn tick(&mut self) {
		self.grids.par_iter_mut().for_each(GridSim::tick);
		self.update_counter += 1;
	}
}
