use std::collections::HashSet;

use fxhash::FxBuildHasher;
use indexmap::IndexSet;
use itertools::Itertools;
use petgraph::stable_graph::NodeIndex;

use crate::gas::constants::{
	MINIMUM_MOLES_DELTA_TO_MOVE, MINIMUM_PRESSURE_DELTA_TO_MOVE, R_IDEAL_GAS_EQUATION,
};

use super::*;

impl GridAtmosphere {
	/// One diffusion pass over the active front.
	///
	/// Every adjacent pair of open tiles is resolved at most once per pass,
	/// in ascending coordinate order, against the pressures archived at the
	/// start of the pass; a pair processed early can't skew what a later
	/// pair sees, and the whole pass is reproducible from the starting
	/// state. Transfers move half the archived pressure delta, so two
	/// equal-volume tiles at one temperature settle in a single pass and
	/// nothing ever overshoots past equilibrium. Returns how many transfers
	/// were applied.
	pub fn process_active_tiles(&mut self) -> usize {
		let front: Vec<NodeIndex> = self
			.active
			.iter()
			.copied()
			.filter(|&node| {
				self.graph
					.node_weight(node)
					.map_or(false, |tile| !tile.blocked && tile.air.is_some())
			})
			.sorted_by_key(|&node| self.graph[node].coord)
			.collect();

		// archive the front and everything it touches
		for &node in &front {
			self.archive_tile(node);
			let neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
			for adj in neighbors {
				self.archive_tile(adj);
			}
		}

		let mut seen: HashSet<(NodeIndex, NodeIndex), FxBuildHasher> = Default::default();
		let mut transfers: Vec<(NodeIndex, NodeIndex, f32)> = Vec::new();
		for &node in &front {
			let neighbors: Vec<NodeIndex> = self
				.graph
				.neighbors(node)
				.sorted_by_key(|&adj| self.graph[adj].coord)
				.collect();
			for adj in neighbors {
				let pair = if self.graph[node].coord <= self.graph[adj].coord {
					(node, adj)
				} else {
					(adj, node)
				};
				if !seen.insert(pair) {
					continue;
				}
				if let Some(transfer) = self.pair_transfer(pair.0, pair.1) {
					transfers.push(transfer);
				}
			}
		}

		// the transfers themselves are atomic remove-then-merge pairs
		let applied = transfers.len();
		for (src, dst, moles) in transfers {
			let removed = self
				.graph
				.node_weight_mut(src)
				.and_then(|tile| tile.air.as_mut())
				.map(|air| air.remove(moles));
			if let Some(removed) = removed {
				if removed.total_moles() > 0.0 {
					if let Some(air) = self
						.graph
						.node_weight_mut(dst)
						.and_then(|tile| tile.air.as_mut())
					{
						air.merge(removed);
					}
				}
			}
		}

		// re-queue whatever still disagrees with a neighbor, settle the rest
		let mut endpoints: IndexSet<NodeIndex, FxBuildHasher> = front.into_iter().collect();
		for &(a, b) in &seen {
			endpoints.insert(a);
			endpoints.insert(b);
		}
		for node in endpoints {
			if self.wants_processing(node) {
				self.add_active_tile(node);
			} else {
				self.remove_active_tile(node);
			}
		}
		applied
	}

	fn archive_tile(&mut self, node: NodeIndex) {
		if let Some(tile) = self.graph.node_weight_mut(node) {
			match tile.air.as_ref() {
				Some(air) => {
					tile.archived_pressure = air.pressure();
					tile.archived_temperature = air.get_temperature();
				}
				None => {
					tile.archived_pressure = 0.0;
					tile.archived_temperature = 0.0;
				}
			}
		}
	}

	/// Decides the transfer for one open-open pair from archived state:
	/// `(source, destination, moles)`, or `None` when the pair is settled or
	/// the source is too cold to derive a mole count from.
	fn pair_transfer(&self, a: NodeIndex, b: NodeIndex) -> Option<(NodeIndex, NodeIndex, f32)> {
		let tile_a = self.graph.node_weight(a)?;
		let tile_b = self.graph.node_weight(b)?;
		if tile_a.blocked || tile_b.blocked {
			return None;
		}
		let (vol_a, vol_b) = (tile_a.air.as_ref()?.volume, tile_b.air.as_ref()?.volume);
		let delta = tile_a.archived_pressure - tile_b.archived_pressure;
		if delta.abs() <= MINIMUM_PRESSURE_DELTA_TO_MOVE {
			return None;
		}
		let (src, dst, delta) = if delta > 0.0 {
			(a, b, delta)
		} else {
			(b, a, -delta)
		};
		let src_temperature = self.graph[src].archived_temperature;
		if src_temperature <= 0.0 {
			return None;
		}
		let shared_volume = vol_a.min(vol_b);
		let moles = (delta * 0.5) * shared_volume / (src_temperature * R_IDEAL_GAS_EQUATION);
		(moles > MINIMUM_MOLES_DELTA_TO_MOVE).then_some((src, dst, moles))
	}

	fn wants_processing(&self, node: NodeIndex) -> bool {
		let Some(tile) = self.graph.node_weight(node) else {
			return false;
		};
		if tile.blocked || tile.air.is_none() {
			return false;
		}
		let pressure = tile.pressure();
		self.graph.neighbors(node).any(|adj| {
			let other = &self.graph[adj];
			!other.blocked
				&& other.air.is_some()
				&& (pressure - other.pressure()).abs() > MINIMUM_PRESSURE_DELTA_TO_MOVE
		})
	}
}
