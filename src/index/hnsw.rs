//! HNSW (Hierarchical Navigable Small World) shard index.
//!
//! Each shard of the benchmark is one HNSW graph over that shard's documents.
//! Nodes store the document's *global* id, so shard results can be merged
//! without any id translation.
//!
//! # Algorithm Overview
//!
//! - Each node is assigned to layers 0..L where L follows exponential decay
//! - Layer 0 contains all nodes; higher layers are progressively sparser
//! - Search greedily descends the upper layers, then beam-searches layer 0
//!
//! # Collaborative pruning
//!
//! When a [`ScoreBound`] is supplied, the layer-0 beam search stops once its
//! best remaining candidate scores below `max(local floor, bound)`, never
//! admits neighbors scoring below the bound, and periodically publishes its
//! current top-K so other shards can tighten their own bound.
//!
//! # Parameters
//!
//! - `m`: Max connections per node (except layer 0). Higher = better recall, more memory
//! - `ef_construction`: Beam width during index building. Higher = better graph, slower build
//! - `ef_search`: Beam width during search. Higher = better recall, slower search

use crate::constants::{hnsw as defaults, pruning};
use crate::distance::Similarity;
use crate::error::{Result, ShardKnnError};
use crate::index::traits::{ScoreBound, ShardHits, ShardIndex};
use crate::types::{GlobalDocId, ScoredHit};
use crate::vector::{Vector, VectorSet};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Node identifier within the index.
type NodeId = usize;

/// A node with its similarity to the query. Orders by score, best greatest.
#[derive(Clone, Copy)]
struct ScoredNode {
    id: NodeId,
    score: f32,
}

impl PartialEq for ScoredNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredNode {}

impl PartialOrd for ScoredNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Build-time parameters of a shard index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub similarity: Similarity,
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: defaults::DEFAULT_M,
            ef_construction: defaults::DEFAULT_EF_CONSTRUCTION,
            ef_search: defaults::DEFAULT_EF_SEARCH,
            similarity: Similarity::DotProduct,
            seed: defaults::DEFAULT_SEED,
        }
    }
}

impl HnswParams {
    /// Reject parameter combinations that cannot build a usable graph.
    pub fn validate(&self) -> Result<()> {
        if self.m < 2 {
            return Err(ShardKnnError::invalid_parameter("HNSW m must be >= 2"));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(ShardKnnError::invalid_parameter(
                "HNSW ef_construction and ef_search must be >= 1",
            ));
        }
        Ok(())
    }
}

/// Graph connections for a node at each layer (used during construction).
struct NodeConnections {
    layers: Vec<SmallVec<[NodeId; 32]>>,
}

/// Flattened graph structure for fast, lock-free search.
/// Layer 0 neighbors are stored contiguously for cache efficiency.
struct FlatGraph {
    /// For each node: (offset, count) into `layer0_neighbors`
    layer0_offsets: Vec<(usize, usize)>,
    layer0_neighbors: Vec<NodeId>,
    /// Higher layers stored separately (sparse, less critical)
    higher_layers: Vec<Vec<SmallVec<[NodeId; 32]>>>,
    max_layer: usize,
}

impl FlatGraph {
    fn build_from(graph: &[RwLock<NodeConnections>], max_layer: usize) -> Self {
        let n = graph.len();
        let mut layer0_offsets = Vec::with_capacity(n);
        let mut layer0_neighbors = Vec::new();
        let mut higher_layers: Vec<Vec<SmallVec<[NodeId; 32]>>> =
            (0..max_layer).map(|_| vec![SmallVec::new(); n]).collect();

        for (node_id, node_lock) in graph.iter().enumerate() {
            let node = node_lock.read();

            let offset = layer0_neighbors.len();
            if let Some(layer0) = node.layers.first() {
                layer0_neighbors.extend_from_slice(layer0);
            }
            layer0_offsets.push((offset, layer0_neighbors.len() - offset));

            for (layer_idx, neighbors) in node.layers.iter().enumerate().skip(1) {
                if layer_idx <= max_layer {
                    higher_layers[layer_idx - 1][node_id] = neighbors.clone();
                }
            }
        }

        Self {
            layer0_offsets,
            layer0_neighbors,
            higher_layers,
            max_layer,
        }
    }

    #[inline]
    fn neighbors(&self, node_id: NodeId, layer: usize) -> &[NodeId] {
        if layer == 0 {
            let (offset, count) = self.layer0_offsets[node_id];
            return &self.layer0_neighbors[offset..offset + count];
        }
        if layer > self.max_layer {
            return &[];
        }
        &self.higher_layers[layer - 1][node_id]
    }
}

/// Serialized form of an index: everything needed to reopen a shard.
#[derive(Serialize, Deserialize)]
pub(crate) struct HnswSnapshot {
    pub(crate) params: HnswParams,
    pub(crate) dim: usize,
    pub(crate) ids: Vec<GlobalDocId>,
    pub(crate) vectors: Vec<f32>,
    /// node -> layer -> neighbors
    pub(crate) adjacency: Vec<Vec<Vec<NodeId>>>,
    pub(crate) entry_point: Option<NodeId>,
    pub(crate) max_layer: usize,
}

/// HNSW graph over one shard's documents.
pub struct HnswIndex {
    /// Global ids, indexed by node
    ids: Vec<GlobalDocId>,
    /// Flat vector data for cache-efficient similarity computation
    vector_data: Vec<f32>,
    dim: usize,
    /// Graph connections (used during construction)
    graph: Vec<RwLock<NodeConnections>>,
    /// Lock-free copy of `graph`, present once finalized
    flat_graph: Option<FlatGraph>,
    entry_point: Option<NodeId>,
    max_layer: usize,
    params: HnswParams,
    m_max: usize,
    m_max0: usize,
    /// Normalization factor for level generation
    ml: f64,
    rng: StdRng,
}

impl HnswIndex {
    /// Create an empty index.
    pub fn new(params: HnswParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            ids: Vec::new(),
            vector_data: Vec::new(),
            dim: 0,
            graph: Vec::new(),
            flat_graph: None,
            entry_point: None,
            max_layer: 0,
            params,
            m_max: params.m,
            m_max0: params.m * 2,
            ml: 1.0 / (params.m as f64).ln(),
            rng: StdRng::seed_from_u64(params.seed),
        })
    }

    /// Build a finalized index over `vectors`, assigning global ids
    /// `first_id, first_id + 1, ...` in row order.
    pub fn build(vectors: &VectorSet, first_id: u64, params: HnswParams) -> Result<Self> {
        let mut index = Self::new(params)?;
        for (offset, row) in vectors.iter().enumerate() {
            index.add(Vector::new(first_id + offset as u64, row.to_vec()))?;
        }
        index.finalize();
        Ok(index)
    }

    /// Set the beam width for search operations.
    pub fn set_ef_search(&mut self, ef: usize) {
        self.params.ef_search = ef.max(1);
    }

    /// Build-time parameters, with the current `ef_search`.
    pub fn params(&self) -> HnswParams {
        self.params
    }

    fn random_layer(&mut self) -> usize {
        // gen::<f64>() is in [0, 1); 1 - r keeps ln() finite.
        let r: f64 = 1.0 - self.rng.gen::<f64>();
        (-r.ln() * self.ml).floor() as usize
    }

    /// Add a vector to the index.
    pub fn add(&mut self, vector: Vector) -> Result<()> {
        if self.dim == 0 {
            if vector.dim() == 0 {
                return Err(ShardKnnError::invalid_parameter("cannot index an empty vector"));
            }
            self.dim = vector.dim();
        } else if vector.dim() != self.dim {
            return Err(ShardKnnError::dimension_mismatch(self.dim, vector.dim()));
        }

        // Invalidate flat graph on modification
        self.flat_graph = None;

        let node_id = self.ids.len();
        let layer = self.random_layer();

        self.ids.push(vector.id);
        self.vector_data.extend_from_slice(&vector.data);

        let layers = (0..=layer).map(|_| SmallVec::new()).collect();
        self.graph.push(RwLock::new(NodeConnections { layers }));

        let Some(entry_point) = self.entry_point else {
            self.entry_point = Some(node_id);
            self.max_layer = layer;
            return Ok(());
        };

        let mut ep = vec![entry_point];

        // Search from top layer down to target layer + 1
        for lc in (layer + 1..=self.max_layer).rev() {
            ep = self.search_layer_build(node_id, &ep, 1, lc);
        }

        // Insert at layers 0 to target layer
        for lc in (0..=layer.min(self.max_layer)).rev() {
            let candidates = self.search_layer_build(node_id, &ep, self.params.ef_construction, lc);
            let neighbor_m = if lc == 0 { self.m_max0 } else { self.m_max };
            let neighbors = self.select_neighbors(node_id, &candidates, neighbor_m);

            for &neighbor in &neighbors {
                self.add_connection(node_id, neighbor, lc);
                self.add_connection(neighbor, node_id, lc);
                self.prune_connections(neighbor, neighbor_m, lc);
            }

            ep = neighbors;
        }

        if layer > self.max_layer {
            self.entry_point = Some(node_id);
            self.max_layer = layer;
        }
        Ok(())
    }

    /// Freeze the graph into its lock-free search layout.
    /// Call this after adding all vectors.
    pub fn finalize(&mut self) {
        if self.flat_graph.is_none() && !self.graph.is_empty() {
            self.flat_graph = Some(FlatGraph::build_from(&self.graph, self.max_layer));
        }
    }

    /// Return true if the lock-free search layout is current.
    pub fn is_finalized(&self) -> bool {
        self.flat_graph.is_some()
    }

    #[inline]
    fn vector(&self, node_id: NodeId) -> &[f32] {
        let start = node_id * self.dim;
        &self.vector_data[start..start + self.dim]
    }

    #[inline]
    fn score_nodes(&self, a: NodeId, b: NodeId) -> f32 {
        self.params.similarity.score(self.vector(a), self.vector(b))
    }

    #[inline]
    fn score_query(&self, query: &[f32], node_id: NodeId) -> f32 {
        self.params.similarity.score(query, self.vector(node_id))
    }

    /// Neighbors of `node_id` at `layer`, from the flat graph when available.
    fn neighbors_into(&self, node_id: NodeId, layer: usize, buf: &mut Vec<NodeId>) {
        buf.clear();
        if let Some(flat) = &self.flat_graph {
            buf.extend_from_slice(flat.neighbors(node_id, layer));
            return;
        }
        let node = self.graph[node_id].read();
        if let Some(neighbors) = node.layers.get(layer) {
            buf.extend_from_slice(neighbors);
        }
    }

    fn search_layer_build(&self, query_node: NodeId, entry_points: &[NodeId], ef: usize, layer: usize) -> Vec<NodeId> {
        let query = self.vector(query_node);

        let mut visited = vec![false; self.graph.len()];
        let mut candidates: BinaryHeap<ScoredNode> = BinaryHeap::with_capacity(ef);
        let mut results: BinaryHeap<Reverse<ScoredNode>> = BinaryHeap::with_capacity(ef + 1);
        let mut buf = Vec::new();

        for &ep in entry_points {
            if !visited[ep] {
                visited[ep] = true;
                let node = ScoredNode { id: ep, score: self.score_query(query, ep) };
                candidates.push(node);
                results.push(Reverse(node));
            }
        }

        while let Some(current) = candidates.pop() {
            let worst = results.peek().map(|n| n.0.score).unwrap_or(f32::NEG_INFINITY);
            if current.score < worst && results.len() >= ef {
                break;
            }

            self.neighbors_into(current.id, layer, &mut buf);
            for &neighbor in &buf {
                if visited[neighbor] {
                    continue;
                }
                visited[neighbor] = true;
                let score = self.score_query(query, neighbor);
                let worst = results.peek().map(|n| n.0.score).unwrap_or(f32::NEG_INFINITY);

                if score > worst || results.len() < ef {
                    let node = ScoredNode { id: neighbor, score };
                    candidates.push(node);
                    results.push(Reverse(node));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_iter().map(|n| n.0.id).collect()
    }

    fn select_neighbors(&self, query_node: NodeId, candidates: &[NodeId], m: usize) -> Vec<NodeId> {
        let mut scored: Vec<ScoredNode> = candidates
            .iter()
            .filter(|&&id| id != query_node)
            .map(|&id| ScoredNode { id, score: self.score_nodes(query_node, id) })
            .collect();
        scored.sort_by(|a, b| b.cmp(a));
        scored.into_iter().take(m).map(|n| n.id).collect()
    }

    fn add_connection(&self, from: NodeId, to: NodeId, layer: usize) {
        let mut node = self.graph[from].write();
        if layer < node.layers.len() && !node.layers[layer].contains(&to) {
            node.layers[layer].push(to);
        }
    }

    fn prune_connections(&self, node_id: NodeId, m: usize, layer: usize) {
        let neighbors: Vec<NodeId> = {
            let node = self.graph[node_id].read();
            if layer >= node.layers.len() || node.layers[layer].len() <= m {
                return;
            }
            node.layers[layer].to_vec()
        };

        let kept = self.select_neighbors(node_id, &neighbors, m);

        let mut node = self.graph[node_id].write();
        if layer < node.layers.len() {
            node.layers[layer] = kept.into_iter().collect();
        }
    }

    /// Search for the `k` most similar documents.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredHit> {
        self.search_with_bound(query, k, None).hits
    }

    /// Search for the `k` most similar documents, optionally under a pruning
    /// bound, and report how many nodes were scored.
    pub fn search_with_bound(&self, query: &[f32], k: usize, bound: Option<&dyn ScoreBound>) -> ShardHits {
        let Some(entry_point) = self.entry_point else {
            return ShardHits {
                hits: Vec::new(),
                visited: Some(0),
            };
        };
        if k == 0 {
            return ShardHits {
                hits: Vec::new(),
                visited: Some(0),
            };
        }

        let mut scored: u64 = 1;
        let mut buf = Vec::new();
        let mut ep_id = entry_point;
        let mut ep_score = self.score_query(query, entry_point);

        // Greedy search through higher layers
        for lc in (1..=self.max_layer).rev() {
            let mut changed = true;
            while changed {
                changed = false;
                self.neighbors_into(ep_id, lc, &mut buf);
                for &neighbor in &buf {
                    let score = self.score_query(query, neighbor);
                    scored += 1;
                    if score > ep_score {
                        ep_id = neighbor;
                        ep_score = score;
                        changed = true;
                    }
                }
            }
        }

        // Beam search on layer 0
        let ef = self.params.ef_search.max(k);
        let mut visited = vec![false; self.ids.len()];
        let mut candidates: BinaryHeap<ScoredNode> = BinaryHeap::with_capacity(ef);
        let mut results: BinaryHeap<Reverse<ScoredNode>> = BinaryHeap::with_capacity(ef + 1);

        visited[ep_id] = true;
        let start = ScoredNode { id: ep_id, score: ep_score };
        candidates.push(start);
        results.push(Reverse(start));

        let mut global_floor = f32::NEG_INFINITY;
        let mut expansions = 0usize;

        while let Some(current) = candidates.pop() {
            if let Some(bound) = bound {
                if expansions % pruning::BOUND_REFRESH_INTERVAL == 0 {
                    global_floor = bound.current();
                }
                if expansions > 0 && expansions % pruning::PUBLISH_INTERVAL == 0 {
                    bound.publish(&self.top_hits(&results, k));
                }
            }
            expansions += 1;

            let local_floor = if results.len() >= ef {
                results.peek().map(|n| n.0.score).unwrap_or(f32::NEG_INFINITY)
            } else {
                f32::NEG_INFINITY
            };
            if current.score < local_floor.max(global_floor) {
                break;
            }

            self.neighbors_into(current.id, 0, &mut buf);
            for &neighbor in &buf {
                if visited[neighbor] {
                    continue;
                }
                visited[neighbor] = true;
                let score = self.score_query(query, neighbor);
                scored += 1;
                if score < global_floor {
                    continue;
                }

                let worst = results.peek().map(|n| n.0.score).unwrap_or(f32::NEG_INFINITY);
                if score > worst || results.len() < ef {
                    let node = ScoredNode { id: neighbor, score };
                    candidates.push(node);
                    results.push(Reverse(node));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        ShardHits {
            hits: self.top_hits(&results, k),
            visited: Some(scored),
        }
    }

    /// Best `k` entries of a result heap as hits with global ids.
    fn top_hits(&self, results: &BinaryHeap<Reverse<ScoredNode>>, k: usize) -> Vec<ScoredHit> {
        let mut hits: Vec<ScoredHit> = results
            .iter()
            .map(|n| ScoredHit {
                id: self.ids[n.0.id],
                score: n.0.score,
            })
            .collect();
        hits.sort_by(ScoredHit::rank_cmp);
        hits.truncate(k);
        hits
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Capture the index for persistence.
    pub(crate) fn to_snapshot(&self) -> HnswSnapshot {
        let adjacency = self
            .graph
            .iter()
            .map(|node| node.read().layers.iter().map(|l| l.to_vec()).collect())
            .collect();
        HnswSnapshot {
            params: self.params,
            dim: self.dim,
            ids: self.ids.clone(),
            vectors: self.vector_data.clone(),
            adjacency,
            entry_point: self.entry_point,
            max_layer: self.max_layer,
        }
    }

    /// Rebuild a finalized index from a snapshot, checking its internal consistency.
    pub(crate) fn from_snapshot(snapshot: HnswSnapshot) -> Result<Self> {
        let HnswSnapshot {
            params,
            dim,
            ids,
            vectors,
            adjacency,
            entry_point,
            max_layer,
        } = snapshot;

        let n = ids.len();
        if vectors.len() != n * dim || adjacency.len() != n {
            return Err(ShardKnnError::index_corrupted(format!(
                "{} ids, {} floats (dim {}), {} adjacency entries",
                n,
                vectors.len(),
                dim,
                adjacency.len()
            )));
        }
        match entry_point {
            Some(ep) if ep >= n => {
                return Err(ShardKnnError::index_corrupted("entry point out of range"));
            }
            None if n > 0 => {
                return Err(ShardKnnError::index_corrupted("non-empty index without entry point"));
            }
            _ => {}
        }
        if adjacency.iter().flatten().flatten().any(|&neighbor| neighbor >= n) {
            return Err(ShardKnnError::index_corrupted("neighbor id out of range"));
        }

        let mut index = Self::new(params)?;
        index.dim = dim;
        index.ids = ids;
        index.vector_data = vectors;
        index.graph = adjacency
            .into_iter()
            .map(|layers| {
                RwLock::new(NodeConnections {
                    layers: layers.into_iter().map(SmallVec::from_vec).collect(),
                })
            })
            .collect();
        index.entry_point = entry_point;
        index.max_layer = max_layer;
        index.finalize();
        Ok(index)
    }
}

impl ShardIndex for HnswIndex {
    fn search(&self, query: &[f32], k: usize, bound: Option<&dyn ScoreBound>) -> Result<ShardHits> {
        if !self.is_empty() && query.len() != self.dim {
            return Err(ShardKnnError::dimension_mismatch(self.dim, query.len()));
        }
        Ok(self.search_with_bound(query, k, bound))
    }

    fn num_docs(&self) -> usize {
        self.len()
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
