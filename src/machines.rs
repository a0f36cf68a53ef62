use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::gas::constants::*;
use crate::gas::GasIDX;
use crate::pipes::{PipeId, PipeNet};
use crate::tiles::{GridAtmosphere, TileCoord};

bitflags! {
	/// Which pressure bounds a vent enforces while pumping.
	#[derive(Copy, Clone, Debug, PartialEq, Eq)]
	pub struct VentPressureBound: u8 {
		const EXTERNAL_BOUND = 0b1;
		const INTERNAL_BOUND = 0b10;
	}
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VentPumpDirection {
	#[default]
	Releasing,
	Siphoning,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrubberPumpDirection {
	#[default]
	Scrubbing,
	Siphoning,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermoMachineMode {
	#[default]
	Freezer,
	Heater,
}

/// An air vent: pushes pipe gas into the room up to its external pressure
/// bound, or siphons room gas back into the pipe down to its internal one.
/// The direction is set from outside (a player or an alarm controller); the
/// vent itself never flips it.
pub struct VentPump {
	pub direction: VentPumpDirection,
	pub external_bound: f32,
	pub internal_bound: f32,
	pub pressure_checks: VentPressureBound,
}

impl Default for VentPump {
	fn default() -> Self {
		Self {
			direction: VentPumpDirection::Releasing,
			external_bound: ONE_ATMOSPHERE,
			internal_bound: 0.0,
			pressure_checks: VentPressureBound::EXTERNAL_BOUND,
		}
	}
}

/// An air scrubber: samples a volume-rate-bounded fraction of the room each
/// tick, keeps only the filtered species, and puts the rest back where it
/// came from. Siphoning mode takes everything instead, no filtering.
pub struct Scrubber {
	pub direction: ScrubberPumpDirection,
	pub volume_rate: f32,
	/// Also scrub the cardinally adjacent tiles.
	pub wide_net: bool,
	pub filter_gases: Vec<GasIDX>,
}

impl Default for Scrubber {
	fn default() -> Self {
		Self {
			direction: ScrubberPumpDirection::Scrubbing,
			volume_rate: 200.0,
			wide_net: false,
			filter_gases: Vec::new(),
		}
	}
}

/// A gas heater or freezer on a pipe loop. Pulls the pipe gas toward its
/// target temperature by pooling thermal energy with its own exchanger mass,
/// so a small machine moves a big pipe net slowly rather than snapping it to
/// the target.
pub struct ThermoMachine {
	pub mode: ThermoMachineMode,
	pub target_temperature: f32,
	/// Heat capacity of the exchanger itself, joules per kelvin.
	pub heat_capacity: f32,
	/// Combined rating of the installed parts; widens the reachable band.
	pub part_rating: f32,
}

impl Default for ThermoMachine {
	fn default() -> Self {
		Self {
			mode: ThermoMachineMode::Freezer,
			target_temperature: T20C,
			heat_capacity: THERMOMACHINE_BASE_HEAT_CAPACITY,
			part_rating: 1.0,
		}
	}
}

impl ThermoMachine {
	/// The temperature band this machine can actually reach, scaling with
	/// its installed parts.
	pub fn temperature_range(&self) -> (f32, f32) {
		match self.mode {
			ThermoMachineMode::Freezer => (
				(T0C - THERMOMACHINE_FREEZER_TEMPERATURE_SPAN * self.part_rating).max(TCMB),
				T20C,
			),
			ThermoMachineMode::Heater => (
				T20C,
				T20C + THERMOMACHINE_HEATER_TEMPERATURE_SPAN * self.part_rating,
			),
		}
	}
}

/// A passive vent: a dumb opening between pipe and room that equalizes
/// toward whichever side is lower, no bounds, no enable switch logic beyond
/// the machine's own.
#[derive(Default)]
pub struct PassiveVent;

/// An outlet injector: exhaust port that always pushes pipe gas into the
/// room at a fixed volume rate, with no pressure bound.
pub struct OutletInjector {
	pub volume_rate: f32,
}

impl Default for OutletInjector {
	fn default() -> Self {
		Self { volume_rate: 50.0 }
	}
}

/// The five device flavors, dispatched through one tick entry point.
pub enum MachineKind {
	Vent(VentPump),
	Scrubber(Scrubber),
	PassiveVent(PassiveVent),
	ThermoMachine(ThermoMachine),
	OutletInjector(OutletInjector),
}

/// One placed atmospherics device: a policy plus handles to the pipe node
/// it taps and the tile it sits on. It owns neither; all gas movement goes
/// through the grid's and the pipe arena's own interfaces.
pub struct Machine {
	pub enabled: bool,
	pipe: PipeId,
	tile: TileCoord,
	pub kind: MachineKind,
}

impl Machine {
	pub fn new(kind: MachineKind, pipe: PipeId, tile: TileCoord) -> Self {
		Self {
			enabled: true,
			pipe,
			tile,
			kind,
		}
	}
	pub fn pipe(&self) -> PipeId {
		self.pipe
	}
	pub fn tile(&self) -> TileCoord {
		self.tile
	}
}

/// Runs one device tick. A disabled machine, a machine whose pipe node is
/// gone, or a machine over an off-grid or airtight tile does nothing; those
/// are ordinary mid-construction states.
pub fn tick_machine(machine: &Machine, grid: &mut GridAtmosphere, pipes: &mut PipeNet) {
	if !machine.enabled {
		return;
	}
	if pipes.air(machine.pipe).is_none() {
		tracing::trace!(pipe = ?machine.pipe, tile = ?machine.tile, "machine has no pipe network, skipping");
		return;
	}
	match &machine.kind {
		MachineKind::Vent(vent) => tick_vent(vent, machine.pipe, machine.tile, grid, pipes),
		MachineKind::Scrubber(scrubber) => {
			scrub_tile(scrubber, machine.tile, machine.pipe, grid, pipes);
			if scrubber.wide_net {
				for adj in grid.adjacent_coords(machine.tile) {
					scrub_tile(scrubber, adj, machine.pipe, grid, pipes);
				}
			}
		}
		MachineKind::PassiveVent(_) => tick_passive_vent(machine.pipe, machine.tile, grid, pipes),
		MachineKind::ThermoMachine(thermo) => tick_thermo_machine(thermo, machine.pipe, pipes),
		MachineKind::OutletInjector(injector) => {
			tick_outlet_injector(injector, machine.pipe, machine.tile, grid, pipes)
		}
	}
}

fn open_tile_readings(grid: &GridAtmosphere, coord: TileCoord) -> Option<(f32, f32, f32, f32)> {
	let tile = grid.tile_at(coord)?;
	if tile.is_blocked() {
		return None;
	}
	let air = tile.air()?;
	Some((air.pressure(), air.volume, air.get_temperature(), air.total_moles()))
}

fn tick_vent(
	vent: &VentPump,
	pipe: PipeId,
	tile: TileCoord,
	grid: &mut GridAtmosphere,
	pipes: &mut PipeNet,
) {
	let Some((env_pressure, env_volume, env_temperature, _)) = open_tile_readings(grid, tile)
	else {
		tracing::trace!(?tile, "vent over an airless tile, skipping");
		return;
	};
	match vent.direction {
		VentPumpDirection::Releasing => {
			let (pipe_pressure, pipe_temperature) = match pipes.air(pipe) {
				Some(air) => (air.pressure(), air.get_temperature()),
				None => return,
			};
			let mut pressure_delta = MAX_VENT_PRESSURE_DELTA;
			if vent.pressure_checks.contains(VentPressureBound::EXTERNAL_BOUND) {
				pressure_delta = pressure_delta.min(vent.external_bound - env_pressure);
			}
			if vent.pressure_checks.contains(VentPressureBound::INTERNAL_BOUND) {
				pressure_delta = pressure_delta.min(pipe_pressure - vent.internal_bound);
			}
			if pressure_delta > 0.0 && pipe_temperature > 0.0 {
				let transfer_moles =
					pressure_delta * env_volume / (pipe_temperature * R_IDEAL_GAS_EQUATION);
				if let Some(air) = pipes.air_mut(pipe) {
					let removed = air.remove(transfer_moles);
					grid.assume_air(tile, removed);
				}
			}
		}
		VentPumpDirection::Siphoning => {
			if env_pressure <= 0.0 || env_temperature <= 0.0 {
				return;
			}
			let (pipe_pressure, pipe_volume) = match pipes.air(pipe) {
				Some(air) => (air.pressure(), air.volume),
				None => return,
			};
			let our_multiplier = pipe_volume / (env_temperature * R_IDEAL_GAS_EQUATION);
			let mut moles_delta = MAX_VENT_PRESSURE_DELTA * our_multiplier;
			if vent.pressure_checks.contains(VentPressureBound::EXTERNAL_BOUND) {
				moles_delta = moles_delta.min(
					(env_pressure - vent.external_bound) * env_volume
						/ (env_temperature * R_IDEAL_GAS_EQUATION),
				);
			}
			if vent.pressure_checks.contains(VentPressureBound::INTERNAL_BOUND) {
				moles_delta = moles_delta.min((vent.internal_bound - pipe_pressure) * our_multiplier);
			}
			if moles_delta > 0.0 {
				if let Some(removed) = grid.remove_air(tile, moles_delta) {
					if let Some(air) = pipes.air_mut(pipe) {
						air.merge(removed);
					}
				}
			}
		}
	}
}

fn scrub_tile(
	scrubber: &Scrubber,
	coord: TileCoord,
	pipe: PipeId,
	grid: &mut GridAtmosphere,
	pipes: &mut PipeNet,
) {
	let Some(outlet_pressure) = pipes.air(pipe).map(|air| air.pressure()) else {
		return;
	};
	// back-pressure guard
	if outlet_pressure >= MAX_SCRUBBER_PRESSURE {
		tracing::trace!(?coord, "scrubber outlet over pressure ceiling, skipping");
		return;
	}
	let Some((_, env_volume, _, env_moles)) = open_tile_readings(grid, coord) else {
		return;
	};
	if env_volume <= 0.0 {
		return;
	}
	match scrubber.direction {
		ScrubberPumpDirection::Scrubbing => {
			let transfer_moles = (scrubber.volume_rate / env_volume) * env_moles;
			let Some(mut removed) = grid.remove_air(coord, transfer_moles) else {
				return;
			};
			if removed.total_moles() <= GAS_MIN_MOLES {
				return;
			}
			if let Some(outlet) = pipes.air_mut(pipe) {
				removed.scrub_into(outlet, &scrubber.filter_gases);
			}
			// whatever wasn't filtered goes back, not into the void
			grid.assume_air(coord, removed);
		}
		ScrubberPumpDirection::Siphoning => {
			let transfer_moles = env_moles * (scrubber.volume_rate / env_volume);
			if let Some(removed) = grid.remove_air(coord, transfer_moles) {
				if let Some(outlet) = pipes.air_mut(pipe) {
					outlet.merge(removed);
				}
			}
		}
	}
}

fn tick_passive_vent(pipe: PipeId, tile: TileCoord, grid: &mut GridAtmosphere, pipes: &mut PipeNet) {
	let Some((env_pressure, env_volume, env_temperature, env_moles)) =
		open_tile_readings(grid, tile)
	else {
		return;
	};
	let (pipe_pressure, pipe_volume, pipe_temperature) = match pipes.air(pipe) {
		Some(air) => (air.pressure(), air.volume, air.get_temperature()),
		None => return,
	};
	let pressure_delta = (env_pressure - pipe_pressure).abs();
	if (env_temperature <= 0.0 && pipe_temperature <= 0.0)
		|| pressure_delta <= MINIMUM_PASSIVE_VENT_PRESSURE_DELTA
	{
		return;
	}
	if env_pressure < pipe_pressure {
		// pipe into room
		let air_temperature = if env_temperature > 0.0 {
			env_temperature
		} else {
			pipe_temperature
		};
		let transfer_moles = pressure_delta * env_volume / (air_temperature * R_IDEAL_GAS_EQUATION);
		if let Some(air) = pipes.air_mut(pipe) {
			let removed = air.remove(transfer_moles);
			grid.assume_air(tile, removed);
		}
	} else {
		// room into pipe, capped by the volume ratio so a huge room can't
		// slam the whole tile's contents into a tiny pipe in one tick
		let air_temperature = if pipe_temperature > 0.0 {
			pipe_temperature
		} else {
			env_temperature
		};
		let transfer_moles = (pressure_delta * pipe_volume / (air_temperature * R_IDEAL_GAS_EQUATION))
			.min(env_moles * pipe_volume / env_volume);
		if let Some(removed) = grid.remove_air(tile, transfer_moles) {
			if let Some(air) = pipes.air_mut(pipe) {
				air.merge(removed);
			}
		}
	}
}

fn tick_thermo_machine(thermo: &ThermoMachine, pipe: PipeId, pipes: &mut PipeNet) {
	let Some(air) = pipes.air_mut(pipe) else {
		return;
	};
	let air_heat_capacity = air.heat_capacity();
	let combined_heat_capacity = air_heat_capacity + thermo.heat_capacity;
	if combined_heat_capacity <= MINIMUM_HEAT_CAPACITY {
		return;
	}
	let (min_temperature, max_temperature) = thermo.temperature_range();
	let target = thermo
		.target_temperature
		.clamp(min_temperature, max_temperature);
	let combined_energy =
		thermo.heat_capacity * target + air_heat_capacity * air.get_temperature();
	air.set_temperature(combined_energy / combined_heat_capacity);
}

fn tick_outlet_injector(
	injector: &OutletInjector,
	pipe: PipeId,
	tile: TileCoord,
	grid: &mut GridAtmosphere,
	pipes: &mut PipeNet,
) {
	if open_tile_readings(grid, tile).is_none() {
		return;
	}
	let (pipe_pressure, pipe_temperature) = match pipes.air(pipe) {
		Some(air) => (air.pressure(), air.get_temperature()),
		None => return,
	};
	if pipe_temperature <= 0.0 {
		return;
	}
	let transfer_moles =
		pipe_pressure * injector.volume_rate / (pipe_temperature * R_IDEAL_GAS_EQUATION);
	if let Some(air) = pipes.air_mut(pipe) {
		let removed = air.remove(transfer_moles);
		grid.assume_air(tile, removed);
	}
}
