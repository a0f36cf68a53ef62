use std::collections::HashMap;

use eyre::{ensure, Result};
use fxhash::FxBuildHasher;
use petgraph::stable_graph::{NodeIndex, StableUnGraph};
use petgraph::visit::Bfs;

use crate::gas::Mixture;

/// Stable handle to one pipe node in the arena.
pub type PipeId = NodeIndex;

type NetId = u32;

/// One device- or segment-owned connection point into a pipe network. The
/// node itself only knows its plumbed volume and which network it belongs
/// to; the gas lives with the network.
pub struct PipeNode {
	volume: f32,
	net: NetId,
}

/// Arena of every pipe node on one grid. Nodes connected transitively form
/// one network, and each network owns exactly one mixture, so every node of
/// a network always observes identical pressure, temperature, and moles.
/// Connecting two networks merges their mixtures by the usual heat-capacity
/// weighting; a disconnect that severs a network splits the mixture between
/// the two remnants in proportion to their plumbed volumes.
#[derive(Default)]
pub struct PipeNet {
	graph: StableUnGraph<PipeNode, ()>,
	nets: HashMap<NetId, Mixture, FxBuildHasher>,
	next_net: NetId,
}

impl PipeNet {
	pub fn new() -> Self {
		Default::default()
	}

	pub fn node_count(&self) -> usize {
		self.graph.node_count()
	}

	pub fn contains(&self, id: PipeId) -> bool {
		self.graph.node_weight(id).is_some()
	}

	/// Adds an unconnected pipe node with the given plumbed volume; it
	/// starts as a one-node network holding vacuum.
	/// # Errors
	/// If the volume is non-positive or non-finite.
	pub fn add_node(&mut self, volume: f32) -> Result<PipeId> {
		ensure!(
			volume.is_finite() && volume > 0.0,
			"pipe node with invalid volume {volume}"
		);
		let net = self.next_net;
		self.next_net += 1;
		self.nets.insert(net, Mixture::from_vol(volume));
		Ok(self.graph.add_node(PipeNode { volume, net }))
	}

	/// Removes a pipe node (its owning device was dismantled). The node is
	/// first severed from its neighbors, taking its proportional share of
	/// the network's gas with it; that share is dropped along with the node.
	pub fn remove_node(&mut self, id: PipeId) {
		let neighbors: Vec<PipeId> = self.graph.neighbors(id).collect();
		for adj in neighbors {
			self.disconnect(id, adj);
		}
		if let Some(node) = self.graph.remove_node(id) {
			self.nets.remove(&node.net);
			tracing::debug!(?id, "removed pipe node");
		}
	}

	/// Connects two pipe nodes. The first time two previously separate
	/// networks touch, their mixtures merge: moles added together, volumes
	/// added together, temperature the heat-capacity-weighted average.
	/// # Errors
	/// If either node doesn't exist.
	pub fn connect(&mut self, a: PipeId, b: PipeId) -> Result<()> {
		ensure!(self.contains(a), "no pipe node {a:?}");
		ensure!(self.contains(b), "no pipe node {b:?}");
		if a == b || self.graph.find_edge(a, b).is_some() {
			return Ok(());
		}
		self.graph.add_edge(a, b, ());
		let (net_a, net_b) = (self.graph[a].net, self.graph[b].net);
		if net_a != net_b {
			if let Some(absorbed) = self.nets.remove(&net_b) {
				if let Some(mix) = self.nets.get_mut(&net_a) {
					let combined_volume = mix.volume + absorbed.volume;
					mix.merge(absorbed);
					mix.volume = combined_volume;
				}
			}
			let nodes: Vec<PipeId> = self.graph.node_indices().collect();
			for node in nodes {
				if self.graph[node].net == net_b {
					self.graph[node].net = net_a;
				}
			}
		}
		Ok(())
	}

	/// Disconnects two pipe nodes. If that severs the network, the side
	/// holding `b` becomes a new network and the mixture is divided by the
	/// volume ratio of the two remnants.
	pub fn disconnect(&mut self, a: PipeId, b: PipeId) {
		let Some(edge) = self.graph.find_edge(a, b) else {
			return;
		};
		self.graph.remove_edge(edge);
		if self.reachable(a, b) {
			return;
		}
		let severed = self.component(b);
		let severed_volume: f32 = severed.iter().map(|&n| self.graph[n].volume).sum();
		let old_net = self.graph[a].net;
		let new_net = self.next_net;
		self.next_net += 1;
		let split = self.nets.get_mut(&old_net).map(|mix| {
			let total_volume = mix.volume;
			let ratio = if total_volume > 0.0 {
				severed_volume / total_volume
			} else {
				0.0
			};
			let mut split = mix.remove_ratio(ratio);
			split.volume = severed_volume;
			mix.volume = total_volume - severed_volume;
			split
		});
		if let Some(split) = split {
			self.nets.insert(new_net, split);
		} else {
			self.nets.insert(new_net, Mixture::from_vol(severed_volume));
		}
		for &node in &severed {
			self.graph[node].net = new_net;
		}
	}

	/// Read access to the network mixture this node shares.
	pub fn air(&self, id: PipeId) -> Option<&Mixture> {
		self.graph.node_weight(id).and_then(|node| self.nets.get(&node.net))
	}

	/// Write access to the network mixture this node shares.
	pub fn air_mut(&mut self, id: PipeId) -> Option<&mut Mixture> {
		let net = self.graph.node_weight(id)?.net;
		self.nets.get_mut(&net)
	}

	/// Total plumbed volume of the network this node belongs to.
	pub fn network_volume(&self, id: PipeId) -> f32 {
		self.air(id).map_or(0.0, |mix| mix.volume)
	}

	/// Every node sharing a network with the given one, itself included.
	pub fn nodes_in_network(&self, id: PipeId) -> Vec<PipeId> {
		self.graph.node_weight(id).map_or_else(Vec::new, |node| {
			let net = node.net;
			self.graph
				.node_indices()
				.filter(|&n| self.graph[n].net == net)
				.collect()
		})
	}

	fn reachable(&self, from: PipeId, to: PipeId) -> bool {
		let mut bfs = Bfs::new(&self.graph, from);
		while let Some(node) = bfs.next(&self.graph) {
			if node == to {
				return true;
			}
		}
		false
	}

	fn component(&self, start: PipeId) -> Vec<PipeId> {
		let mut out = Vec::new();
		let mut bfs = Bfs::new(&self.graph, start);
		while let Some(node) = bfs.next(&self.graph) {
			out.push(node);
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::gas::constants::*;
	use crate::prototypes::register_standard_gases;

	#[test]
	fn invalid_volume_is_rejected() {
		let mut pipes = PipeNet::new();
		assert!(pipes.add_node(0.0).is_err());
		assert!(pipes.add_node(-100.0).is_err());
		assert!(pipes.add_node(f32::NAN).is_err());
	}

	#[test]
	fn connect_merges_by_heat_capacity() {
		register_standard_gases().unwrap();
		let mut pipes = PipeNet::new();
		let a = pipes.add_node(300.0).unwrap();
		let b = pipes.add_node(100.0).unwrap();
		{
			let air = pipes.air_mut(a).unwrap();
			air.set_moles(0, 30.0);
			air.set_temperature(300.0);
		}
		{
			let air = pipes.air_mut(b).unwrap();
			air.set_moles(0, 10.0);
			air.set_temperature(600.0);
		}
		pipes.connect(a, b).unwrap();
		let mix = pipes.air(a).unwrap();
		assert_eq!(mix.total_moles(), 40.0);
		assert_eq!(mix.volume, 400.0);
		// o2 heat capacities 600 and 200: (600*300 + 200*600)/800 = 375
		assert!((mix.get_temperature() - 375.0).abs() < 0.01);
	}

	#[test]
	fn every_node_of_a_network_sees_the_same_air() {
		register_standard_gases().unwrap();
		let mut pipes = PipeNet::new();
		let a = pipes.add_node(100.0).unwrap();
		let b = pipes.add_node(100.0).unwrap();
		let c = pipes.add_node(100.0).unwrap();
		pipes.connect(a, b).unwrap();
		pipes.connect(b, c).unwrap();
		pipes.air_mut(c).unwrap().set_moles(1, 60.0);
		for id in [a, b, c] {
			assert_eq!(pipes.air(id).unwrap().total_moles(), 60.0);
			assert_eq!(pipes.network_volume(id), 300.0);
		}
		assert_eq!(pipes.nodes_in_network(b).len(), 3);
	}

	#[test]
	fn disconnect_splits_by_volume() {
		register_standard_gases().unwrap();
		let mut pipes = PipeNet::new();
		let a = pipes.add_node(300.0).unwrap();
		let b = pipes.add_node(100.0).unwrap();
		pipes.connect(a, b).unwrap();
		{
			let air = pipes.air_mut(a).unwrap();
			air.set_moles(0, 40.0);
			air.set_temperature(T20C);
		}
		pipes.disconnect(a, b);
		let air_a = pipes.air(a).unwrap();
		let air_b = pipes.air(b).unwrap();
		assert!((air_a.total_moles() - 30.0).abs() < 1e-4);
		assert!((air_b.total_moles() - 10.0).abs() < 1e-4);
		assert_eq!(air_a.volume, 300.0);
		assert_eq!(air_b.volume, 100.0);
		// both remnants keep the original temperature
		assert!((air_a.get_temperature() - T20C).abs() < 0.01);
		assert!((air_b.get_temperature() - T20C).abs() < 0.01);
	}

	#[test]
	fn disconnect_without_severing_changes_nothing() {
		register_standard_gases().unwrap();
		let mut pipes = PipeNet::new();
		let a = pipes.add_node(100.0).unwrap();
		let b = pipes.add_node(100.0).unwrap();
		let c = pipes.add_node(100.0).unwrap();
		pipes.connect(a, b).unwrap();
		pipes.connect(b, c).unwrap();
		pipes.connect(c, a).unwrap();
		pipes.air_mut(a).unwrap().set_moles(0, 30.0);
		pipes.disconnect(a, b);
		// ring still connected through c
		for id in [a, b, c] {
			assert_eq!(pipes.air(id).unwrap().total_moles(), 30.0);
			assert_eq!(pipes.network_volume(id), 300.0);
		}
	}

	#[test]
	fn removing_a_node_takes_its_share() {
		register_standard_gases().unwrap();
		let mut pipes = PipeNet::new();
		let a = pipes.add_node(100.0).unwrap();
		let b = pipes.add_node(100.0).unwrap();
		pipes.connect(a, b).unwrap();
		pipes.air_mut(a).unwrap().set_moles(0, 20.0);
		pipes.remove_node(b);
		assert!(!pipes.contains(b));
		let air = pipes.air(a).unwrap();
		assert!((air.total_moles() - 10.0).abs() < 1e-4);
		assert_eq!(air.volume, 100.0);
	}
}
