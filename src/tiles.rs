pub mod processing;

use std::collections::HashMap;

use eyre::{bail, ensure, Result};
use float_ord::FloatOrd;
use fxhash::FxBuildHasher;
use indexmap::IndexSet;
use petgraph::stable_graph::{NodeIndex, StableUnGraph};

use crate::gas::constants::*;
use crate::gas::{ambient_mixture, Mixture};

/// Grid coordinate of one tile, `(x, y)`.
pub type TileCoord = (i32, i32);

const CARDINAL_OFFSETS: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

/// How a formerly airtight tile gets its first air.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AirSeed {
	/// Start at hard vacuum.
	#[default]
	Vacuum,
	/// Take an even split out of each open cardinal neighbor.
	FromNeighbors,
}

/// One grid cell's atmospheric state. Open tiles own a mutable mixture,
/// airtight ("blocked") tiles own nothing, and space tiles own an immutable
/// mixture that silently discards whatever diffuses into it.
pub struct TileAtmosphere {
	coord: TileCoord,
	air: Option<Mixture>,
	blocked: bool,
	excited: bool,
	// pre-tick state, written at the start of each diffusion pass so that
	// pairs processed later in the pass don't see earlier pairs' updates
	archived_pressure: f32,
	archived_temperature: f32,
}

impl TileAtmosphere {
	pub fn coord(&self) -> TileCoord {
		self.coord
	}
	/// The tile's mixture, if it can hold one.
	pub fn air(&self) -> Option<&Mixture> {
		self.air.as_ref()
	}
	pub fn is_blocked(&self) -> bool {
		self.blocked
	}
	/// Space tiles carry the immutable boundary mixture.
	pub fn is_space(&self) -> bool {
		self.air.as_ref().map_or(false, Mixture::is_immutable)
	}
	/// Whether the tile is queued for diffusion processing.
	pub fn is_excited(&self) -> bool {
		self.excited
	}
	pub fn pressure(&self) -> f32 {
		self.air.as_ref().map_or(0.0, Mixture::pressure)
	}
	pub fn total_moles(&self) -> f32 {
		self.air.as_ref().map_or(0.0, Mixture::total_moles)
	}
}

/// Owns every tile of one station grid: an arena of tiles over an undirected
/// adjacency graph (undirected edges make neighbor symmetry structural), a
/// coordinate lookup, the active-tile set the diffusion pass works from, and
/// the invalidation queue feeding it.
pub struct GridAtmosphere {
	graph: StableUnGraph<TileAtmosphere, ()>,
	map: HashMap<TileCoord, NodeIndex, FxBuildHasher>,
	active: IndexSet<NodeIndex, FxBuildHasher>,
	invalidated: IndexSet<TileCoord, FxBuildHasher>,
	cell_volume: f32,
}

impl Default for GridAtmosphere {
	fn default() -> Self {
		Self::new()
	}
}

impl GridAtmosphere {
	/// A grid with the standard cell volume.
	pub fn new() -> Self {
		Self {
			graph: StableUnGraph::default(),
			map: Default::default(),
			active: Default::default(),
			invalidated: Default::default(),
			cell_volume: CELL_VOLUME,
		}
	}

	/// A grid with a custom per-cell volume.
	/// # Errors
	/// If the volume is non-positive or non-finite; tiles of zero volume
	/// would make every pressure derivation meaningless.
	pub fn with_cell_volume(cell_volume: f32) -> Result<Self> {
		ensure!(
			cell_volume.is_finite() && cell_volume > 0.0,
			"grid with invalid cell volume {cell_volume}"
		);
		let mut ret = Self::new();
		ret.cell_volume = cell_volume;
		Ok(ret)
	}

	pub fn cell_volume(&self) -> f32 {
		self.cell_volume
	}

	pub fn tile_count(&self) -> usize {
		self.graph.node_count()
	}

	pub fn active_tile_count(&self) -> usize {
		self.active.len()
	}

	/// Adds an open tile at the given coordinate, starting at vacuum and
	/// room temperature. Adding where a tile already exists is a no-op.
	pub fn add_tile(&mut self, coord: TileCoord) -> NodeIndex {
		if let Some(&node) = self.map.get(&coord) {
			return node;
		}
		let mut air = Mixture::from_vol(self.cell_volume);
		air.set_temperature(T20C);
		self.insert_tile(coord, Some(air), false)
	}

	/// Adds a space tile: an immutable boundary that gas vents into and
	/// never comes back from.
	pub fn add_space_tile(&mut self, coord: TileCoord) -> NodeIndex {
		if let Some(&node) = self.map.get(&coord) {
			return node;
		}
		let mut air = Mixture::from_vol(self.cell_volume);
		air.mark_immutable();
		self.insert_tile(coord, Some(air), false)
	}

	fn insert_tile(&mut self, coord: TileCoord, air: Option<Mixture>, blocked: bool) -> NodeIndex {
		let node = self.graph.add_node(TileAtmosphere {
			coord,
			air,
			blocked,
			excited: false,
			archived_pressure: 0.0,
			archived_temperature: 0.0,
		});
		self.map.insert(coord, node);
		for (dx, dy) in CARDINAL_OFFSETS {
			if let Some(&adj) = self.map.get(&(coord.0 + dx, coord.1 + dy)) {
				if self.graph.find_edge(node, adj).is_none() {
					self.graph.add_edge(node, adj, ());
				}
			}
		}
		self.invalidate(coord);
		node
	}

	/// Drops a tile entirely (region deallocation). Its gas goes with it;
	/// the neighbors get another diffusion look.
	pub fn remove_tile(&mut self, coord: TileCoord) {
		if let Some(node) = self.map.remove(&coord) {
			let neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
			self.active.swap_remove(&node);
			self.invalidated.swap_remove(&coord);
			self.graph.remove_node(node);
			for adj in neighbors {
				self.add_active_tile(adj);
			}
		}
	}

	/// Marks a tile airtight: its air is dropped and it stops participating
	/// in diffusion until unblocked.
	pub fn set_blocked(&mut self, coord: TileCoord) {
		if let Some(&node) = self.map.get(&coord) {
			let tile = &mut self.graph[node];
			tile.blocked = true;
			tile.excited = false;
			tile.air = None;
			self.active.swap_remove(&node);
			self.invalidate(coord);
		}
	}

	/// Reopens an airtight tile. With `AirSeed::Vacuum` it starts empty;
	/// with `AirSeed::FromNeighbors` each open neighbor contributes an even
	/// split of its own mixture, so no moles appear out of nowhere.
	pub fn unblock(&mut self, coord: TileCoord, seed: AirSeed) {
		let Some(&node) = self.map.get(&coord) else {
			return;
		};
		if !self.graph[node].blocked {
			return;
		}
		let donors: Vec<NodeIndex> = self
			.graph
			.neighbors(node)
			.filter(|&adj| {
				let tile = &self.graph[adj];
				!tile.blocked && tile.air.as_ref().map_or(false, |air| !air.is_immutable())
			})
			.collect();
		{
			let tile = &mut self.graph[node];
			tile.blocked = false;
			let mut air = Mixture::from_vol(self.cell_volume);
			air.set_temperature(T20C);
			tile.air = Some(air);
		}
		if seed == AirSeed::FromNeighbors && !donors.is_empty() {
			let ratio = 1.0 / (donors.len() as f32 + 1.0);
			for adj in donors {
				let share = self.graph[adj].air.as_mut().map(|air| air.remove_ratio(ratio));
				if let (Some(share), Some(air)) = (share, self.graph[node].air.as_mut()) {
					air.merge(share);
				}
			}
		}
		self.invalidate(coord);
	}

	/// Replaces an open tile's mixture from a gas string definition.
	/// # Errors
	/// If there is no tile there, the tile can't hold mutable air, or the
	/// definition is invalid.
	pub fn fill(&mut self, coord: TileCoord, def: &str) -> Result<()> {
		let node = self
			.map
			.get(&coord)
			.copied()
			.ok_or_else(|| eyre::eyre!("no tile at {coord:?}"))?;
		let mix = ambient_mixture(def, self.cell_volume)?;
		let tile = &mut self.graph[node];
		ensure!(!tile.blocked, "tile at {coord:?} is airtight");
		match tile.air.as_mut() {
			Some(air) if !air.is_immutable() => *air = mix,
			_ => bail!("tile at {coord:?} cannot hold air"),
		}
		self.invalidate(coord);
		Ok(())
	}

	/// Read access for anything that needs ambient conditions at a spot.
	pub fn tile_at(&self, coord: TileCoord) -> Option<&TileAtmosphere> {
		self.map.get(&coord).map(|&node| &self.graph[node])
	}

	/// Coordinates of the tiles cardinally adjacent to the given one, in a
	/// stable order.
	pub fn adjacent_coords(&self, coord: TileCoord) -> Vec<TileCoord> {
		let mut out = self.map.get(&coord).map_or_else(Vec::new, |&node| {
			self.graph
				.neighbors(node)
				.map(|adj| self.graph[adj].coord)
				.collect()
		});
		out.sort_unstable();
		out
	}

	/// Merges an externally produced mixture into a tile (explosions, leaks,
	/// devices venting). Off-grid and airtight targets drop the gas; that is
	/// an ordinary gameplay state, not an error.
	pub fn assume_air(&mut self, coord: TileCoord, mix: Mixture) {
		if mix.total_moles() <= 0.0 {
			return;
		}
		match self.map.get(&coord).copied() {
			Some(node) => {
				if let Some(air) = self.graph[node].air.as_mut() {
					air.merge(mix);
					self.invalidate(coord);
				} else {
					tracing::trace!(?coord, "assume_air into an airtight tile, gas dropped");
				}
			}
			None => tracing::trace!(?coord, "assume_air off-grid, gas dropped"),
		}
	}

	/// Removes up to `amount` moles from a tile's mixture and hands them to
	/// the caller, marking the tile for another diffusion look. `None` for
	/// off-grid, airtight, or airless spots.
	pub fn remove_air(&mut self, coord: TileCoord, amount: f32) -> Option<Mixture> {
		let node = self.map.get(&coord).copied()?;
		let removed = self.graph[node].air.as_mut().map(|air| air.remove(amount))?;
		self.invalidate(coord);
		Some(removed)
	}

	/// Queues a tile for revalidation before the next diffusion pass.
	pub fn invalidate(&mut self, coord: TileCoord) {
		self.invalidated.insert(coord);
	}

	/// Drains the invalidation queue, waking each queued tile and its
	/// neighbors for the diffusion pass.
	pub fn revalidate(&mut self) {
		if self.invalidated.is_empty() {
			return;
		}
		let coords: Vec<TileCoord> = self.invalidated.drain(..).collect();
		for coord in coords {
			let Some(&node) = self.map.get(&coord) else {
				continue;
			};
			self.add_active_tile(node);
			let neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
			for adj in neighbors {
				self.add_active_tile(adj);
			}
		}
	}

	/// The highest-pressure open tile, for monitoring consoles and alarms.
	pub fn highest_pressure_tile(&self) -> Option<(TileCoord, f32)> {
		self.graph
			.node_indices()
			.map(|node| &self.graph[node])
			.filter(|tile| !tile.blocked)
			.filter_map(|tile| tile.air.as_ref().map(|air| (tile.coord, air.pressure())))
			.max_by_key(|&(_, pressure)| FloatOrd(pressure))
	}

	fn add_active_tile(&mut self, node: NodeIndex) {
		if let Some(tile) = self.graph.node_weight_mut(node) {
			if !tile.blocked && tile.air.is_some() {
				tile.excited = true;
				self.active.insert(node);
			}
		}
	}

	fn remove_active_tile(&mut self, node: NodeIndex) {
		if let Some(tile) = self.graph.node_weight_mut(node) {
			tile.excited = false;
		}
		self.active.swap_remove(&node);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::prototypes::register_standard_gases;

	pub(crate) const STANDARD_AIR: &str = "o2=21.8;n2=82.1;TEMP=293.15";

	#[test]
	fn neighbor_edges_are_symmetric() {
		register_standard_gases().unwrap();
		let mut grid = GridAtmosphere::new();
		grid.add_tile((0, 0));
		grid.add_tile((0, 1));
		grid.add_tile((1, 0));
		assert_eq!(grid.adjacent_coords((0, 0)), vec![(0, 1), (1, 0)]);
		assert_eq!(grid.adjacent_coords((0, 1)), vec![(0, 0)]);
		assert_eq!(grid.adjacent_coords((1, 0)), vec![(0, 0)]);
	}

	#[test]
	fn zero_volume_grid_is_rejected() {
		assert!(GridAtmosphere::with_cell_volume(0.0).is_err());
		assert!(GridAtmosphere::with_cell_volume(-2500.0).is_err());
		assert!(GridAtmosphere::with_cell_volume(f32::NAN).is_err());
	}

	#[test]
	fn blocked_tiles_hold_no_air() {
		register_standard_gases().unwrap();
		let mut grid = GridAtmosphere::new();
		grid.add_tile((0, 0));
		grid.fill((0, 0), STANDARD_AIR).unwrap();
		grid.set_blocked((0, 0));
		let tile = grid.tile_at((0, 0)).unwrap();
		assert!(tile.is_blocked());
		assert!(tile.air().is_none());
		assert!(grid.fill((0, 0), STANDARD_AIR).is_err());
	}

	#[test]
	fn unblock_seeds_conservatively() {
		register_standard_gases().unwrap();
		let mut grid = GridAtmosphere::new();
		grid.add_tile((0, 0));
		grid.add_tile((2, 0));
		grid.add_tile((1, 0));
		grid.fill((0, 0), STANDARD_AIR).unwrap();
		grid.fill((2, 0), STANDARD_AIR).unwrap();
		grid.set_blocked((1, 0));
		let before: f32 = [(0, 0), (2, 0)]
			.iter()
			.map(|&c| grid.tile_at(c).unwrap().total_moles())
			.sum();
		grid.unblock((1, 0), AirSeed::FromNeighbors);
		let after: f32 = [(0, 0), (1, 0), (2, 0)]
			.iter()
			.map(|&c| grid.tile_at(c).unwrap().total_moles())
			.sum();
		assert!((before - after).abs() < 1e-3, "{before} != {after}");
		assert!(grid.tile_at((1, 0)).unwrap().total_moles() > 0.0);
	}

	#[test]
	fn unblock_to_vacuum_stays_empty() {
		register_standard_gases().unwrap();
		let mut grid = GridAtmosphere::new();
		grid.add_tile((0, 0));
		grid.fill((0, 0), STANDARD_AIR).unwrap();
		grid.add_tile((1, 0));
		grid.set_blocked((1, 0));
		grid.unblock((1, 0), AirSeed::Vacuum);
		assert_eq!(grid.tile_at((1, 0)).unwrap().total_moles(), 0.0);
	}

	#[test]
	fn assume_air_into_airtight_tile_is_dropped() {
		register_standard_gases().unwrap();
		let mut grid = GridAtmosphere::new();
		grid.add_tile((0, 0));
		grid.set_blocked((0, 0));
		let mut mix = Mixture::from_vol(70.0);
		mix.set_moles(0, 50.0);
		mix.set_temperature(T20C);
		grid.assume_air((0, 0), mix);
		assert!(grid.tile_at((0, 0)).unwrap().air().is_none());
	}

	#[test]
	fn highest_pressure_tile_finds_the_peak() {
		register_standard_gases().unwrap();
		let mut grid = GridAtmosphere::new();
		grid.add_tile((0, 0));
		grid.add_tile((5, 5));
		grid.fill((5, 5), "o2=500;TEMP=293.15").unwrap();
		let (coord, pressure) = grid.highest_pressure_tile().unwrap();
		assert_eq!(coord, (5, 5));
		assert!(pressure > 0.0);
	}
}
