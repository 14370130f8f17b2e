//! Vector index for semantic memory
//!
//! Combines an exact scan with an HNSW (Hierarchical Navigable Small World)
//! graph. Below [`IndexConfig::exact_search_threshold`] vectors every query is
//! answered by a full scan; above it the HNSW graph supplies an over-fetched
//! candidate list which is then re-ranked exactly.
//!
//! Ranking is by similarity (descending), then creation time (most recent
//! first), then key (most recently inserted first).
//!
//! The index holds no locks of its own. The semantic store wraps it in a
//! single `RwLock` so that an insert is atomic with respect to readers.
//!
//! # References
//!
//! - Malkov, Y. A., & Yashunin, D. A. (2018). Efficient and robust approximate nearest neighbor
//!   search using Hierarchical Navigable Small World graphs.

use crate::similarity::SimilarityMetric;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use thiserror::Error;
use tripmem_core::Timestamp;

/// Errors that can occur during index operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

impl From<IndexError> for tripmem_core::Error {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::DimensionMismatch { expected, got } => {
                tripmem_core::Error::DimensionMismatch { expected, got }
            }
            IndexError::InvalidParameter(msg) => tripmem_core::Error::Configuration(msg),
        }
    }
}

/// Configuration for the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum number of connections per node per layer (default: 16)
    pub m: usize,

    /// Size of dynamic candidate list during construction (default: 200)
    pub ef_construction: usize,

    /// Size of dynamic candidate list during search (default: 50)
    pub ef_search: usize,

    /// Maximum number of layers in the graph
    pub max_level: usize,

    /// Vector dimension (set when first vector is inserted if not given)
    pub dimension: Option<usize>,

    /// Similarity metric to use
    pub metric: SimilarityMetric,

    /// Normalization multiplier for level generation, 1 / ln(M)
    pub ml: f32,

    /// Below this many vectors queries use an exact scan
    pub exact_search_threshold: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_level: 16,
            dimension: None,
            metric: SimilarityMetric::Cosine,
            ml: 1.0 / (16.0_f32).ln(),
            exact_search_threshold: 2048,
        }
    }
}

impl IndexConfig {
    /// Configuration for small stores (< 10,000 vectors)
    pub fn small() -> Self {
        Self {
            m: 8,
            ef_construction: 100,
            ef_search: 30,
            max_level: 10,
            ml: 1.0 / (8.0_f32).ln(),
            ..Self::default()
        }
    }

    /// Configuration for large stores (> 100,000 vectors)
    pub fn large() -> Self {
        Self {
            m: 32,
            ef_construction: 400,
            ef_search: 100,
            max_level: 20,
            ml: 1.0 / (32.0_f32).ln(),
            ..Self::default()
        }
    }

    /// Set the similarity metric
    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the dimension
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Set ef_search for query time
    pub fn with_ef_search(mut self, ef_search: usize) -> Self {
        self.ef_search = ef_search;
        self
    }

    /// Set the exact-scan threshold
    pub fn with_exact_search_threshold(mut self, threshold: usize) -> Self {
        self.exact_search_threshold = threshold;
        self
    }

    /// Check parameters for values that would break graph construction
    pub fn validate(&self) -> IndexResult<()> {
        if self.m < 2 {
            return Err(IndexError::InvalidParameter("m must be at least 2".to_string()));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(IndexError::InvalidParameter(
                "ef_construction and ef_search must be positive".to_string(),
            ));
        }
        if self.dimension == Some(0) {
            return Err(IndexError::InvalidParameter(
                "dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A node in the HNSW graph
#[derive(Debug, Clone)]
struct Node {
    vector: Vec<f32>,
    created_at: Timestamp,
    level: usize,
    /// Neighbor keys per layer, 0..=level
    neighbors: Vec<Vec<u64>>,
}

impl Node {
    fn new(vector: Vec<f32>, created_at: Timestamp, level: usize) -> Self {
        Self {
            vector,
            created_at,
            level,
            neighbors: vec![Vec::new(); level + 1],
        }
    }
}

/// A candidate during search, ordered so the closest is on top of a max-heap
#[derive(Debug, Clone)]
struct Candidate {
    distance: f32,
    key: u64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.key.cmp(&self.key))
    }
}

/// Max-heap wrapper for candidates (furthest first)
#[derive(Debug, Clone)]
struct FurthestCandidate {
    distance: f32,
    key: u64,
}

impl PartialEq for FurthestCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FurthestCandidate {}

impl PartialOrd for FurthestCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FurthestCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.key.cmp(&other.key))
    }
}

/// A ranked search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Key the vector was inserted under
    pub key: u64,

    /// Similarity to the query (higher is more similar)
    pub score: f32,

    /// Creation time of the indexed entry
    pub created_at: Timestamp,
}

/// Result ordering: best score, then most recent, then latest key
fn rank(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.key.cmp(&a.key))
}

/// Vector index keyed by `u64`
#[derive(Debug)]
pub struct VectorIndex {
    config: IndexConfig,
    nodes: HashMap<u64, Node>,
    entry_point: Option<u64>,
    current_max_level: usize,
}

impl VectorIndex {
    /// Create a new index with the given configuration
    pub fn new(config: IndexConfig) -> IndexResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            nodes: HashMap::new(),
            entry_point: None,
            current_max_level: 0,
        })
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether queries currently go through the HNSW graph
    pub fn is_approximate(&self) -> bool {
        self.nodes.len() >= self.config.exact_search_threshold
    }

    fn check_dimension(&self, vector: &[f32]) -> IndexResult<()> {
        match self.config.dimension {
            Some(dim) if vector.len() != dim => Err(IndexError::DimensionMismatch {
                expected: dim,
                got: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        -self.config.metric.score(a, b)
    }

    fn max_connections(&self, level: usize) -> usize {
        if level == 0 { self.config.m * 2 } else { self.config.m }
    }

    fn random_level(&self) -> usize {
        let uniform = 1.0 - rand_float();
        let level = (-uniform.ln() * self.config.ml).floor() as usize;
        level.min(self.config.max_level)
    }

    /// Insert a vector, replacing any vector already stored under `key`
    pub fn insert(&mut self, key: u64, vector: Vec<f32>, created_at: Timestamp) -> IndexResult<()> {
        self.check_dimension(&vector)?;
        if self.config.dimension.is_none() {
            self.config.dimension = Some(vector.len());
        }

        if self.nodes.contains_key(&key) {
            self.remove(key);
        }

        self.link(key, vector, created_at);
        Ok(())
    }

    /// Place a new node in the graph; the vector is already validated
    fn link(&mut self, key: u64, vector: Vec<f32>, created_at: Timestamp) {
        let node_level = self.random_level();

        let Some(entry_key) = self.entry_point else {
            self.nodes.insert(key, Node::new(vector, created_at, node_level));
            self.entry_point = Some(key);
            self.current_max_level = node_level;
            return;
        };

        // Phase 1: greedy descent through layers above the node's level
        let mut ep = entry_key;
        for level in (node_level + 1..=self.current_max_level).rev() {
            if let Some(nearest) = self.search_layer(&vector, ep, 1, level).first() {
                ep = nearest.key;
            }
        }

        // Phase 2: pick neighbors at each layer the node lives in
        let mut links = Vec::new();
        for level in (0..=node_level.min(self.current_max_level)).rev() {
            let candidates = self.search_layer(&vector, ep, self.config.ef_construction, level);
            let selected: Vec<u64> = candidates
                .iter()
                .take(self.max_connections(level))
                .map(|c| c.key)
                .collect();
            if let Some(nearest) = candidates.first() {
                ep = nearest.key;
            }
            links.push((level, selected));
        }

        self.nodes.insert(key, Node::new(vector, created_at, node_level));
        for (level, selected) in links {
            self.connect(key, &selected, level);
        }

        if node_level > self.current_max_level {
            self.entry_point = Some(key);
            self.current_max_level = node_level;
        }
    }

    /// Search for the `k` best vectors, optionally only those created at or
    /// after `since`
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        since: Option<Timestamp>,
    ) -> IndexResult<Vec<SearchHit>> {
        self.check_dimension(query)?;

        if k == 0 || self.nodes.is_empty() {
            return Ok(Vec::new());
        }

        if !self.is_approximate() {
            return Ok(self.exact_search(query, k, since));
        }

        let ef = self.config.ef_search.max(k.saturating_mul(4));
        let candidates = self.approximate_candidates(query, ef);
        let examined = candidates.len();

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|c| {
                let node = self.nodes.get(&c.key)?;
                if since.is_some_and(|t| node.created_at < t) {
                    return None;
                }
                Some(SearchHit {
                    key: c.key,
                    score: -c.distance,
                    created_at: node.created_at,
                })
            })
            .collect();

        // The filter starved the candidate list; only a full scan can tell
        // whether more matches exist.
        if hits.len() < k && examined < self.nodes.len() {
            return Ok(self.exact_search(query, k, since));
        }

        hits.sort_by(rank);
        hits.truncate(k);
        Ok(hits)
    }

    /// Exhaustive search over every vector
    pub fn exact_search(&self, query: &[f32], k: usize, since: Option<Timestamp>) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .nodes
            .iter()
            .filter(|(_, node)| since.is_none_or(|t| node.created_at >= t))
            .map(|(key, node)| SearchHit {
                key: *key,
                score: self.config.metric.score(query, &node.vector),
                created_at: node.created_at,
            })
            .collect();

        if hits.len() > k {
            hits.select_nth_unstable_by(k - 1, rank);
            hits.truncate(k);
        }
        hits.sort_by(rank);
        hits
    }

    fn approximate_candidates(&self, query: &[f32], ef: usize) -> Vec<Candidate> {
        let Some(mut ep) = self.entry_point else {
            return Vec::new();
        };

        for level in (1..=self.current_max_level).rev() {
            if let Some(nearest) = self.search_layer(query, ep, 1, level).first() {
                ep = nearest.key;
            }
        }

        self.search_layer(query, ep, ef, 0)
    }

    /// Search a single layer starting from an entry point; closest first
    fn search_layer(&self, query: &[f32], entry_point: u64, ef: usize, level: usize) -> Vec<Candidate> {
        let Some(entry_node) = self.nodes.get(&entry_point) else {
            return Vec::new();
        };

        let entry_dist = self.distance(query, &entry_node.vector);

        let mut visited: HashSet<u64> = HashSet::new();
        visited.insert(entry_point);

        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
        candidates.push(Candidate {
            distance: entry_dist,
            key: entry_point,
        });

        let mut results: BinaryHeap<FurthestCandidate> = BinaryHeap::new();
        results.push(FurthestCandidate {
            distance: entry_dist,
            key: entry_point,
        });

        while let Some(current) = candidates.pop() {
            let furthest_dist = results.peek().map(|r| r.distance).unwrap_or(f32::INFINITY);
            if current.distance > furthest_dist && results.len() >= ef {
                break;
            }

            let Some(current_node) = self.nodes.get(&current.key) else {
                continue;
            };
            let Some(layer) = current_node.neighbors.get(level) else {
                continue;
            };

            for &neighbor_key in layer {
                if !visited.insert(neighbor_key) {
                    continue;
                }

                let Some(neighbor_node) = self.nodes.get(&neighbor_key) else {
                    continue;
                };

                let dist = self.distance(query, &neighbor_node.vector);
                let furthest_dist = results.peek().map(|r| r.distance).unwrap_or(f32::INFINITY);

                if dist < furthest_dist || results.len() < ef {
                    candidates.push(Candidate {
                        distance: dist,
                        key: neighbor_key,
                    });
                    results.push(FurthestCandidate {
                        distance: dist,
                        key: neighbor_key,
                    });

                    while results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut result_vec: Vec<Candidate> = results
            .into_iter()
            .map(|fc| Candidate {
                distance: fc.distance,
                key: fc.key,
            })
            .collect();

        result_vec.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        result_vec
    }

    /// Link `key` to `neighbors` at `level` and add the reverse links,
    /// pruning any neighbor that ends up over its connection budget
    fn connect(&mut self, key: u64, neighbors: &[u64], level: usize) {
        if let Some(node) = self.nodes.get_mut(&key) {
            if let Some(layer) = node.neighbors.get_mut(level) {
                *layer = neighbors.to_vec();
            }
        }

        let max = self.max_connections(level);
        for &neighbor_key in neighbors {
            let links = match self.nodes.get_mut(&neighbor_key) {
                Some(neighbor) if level < neighbor.neighbors.len() => {
                    let layer = &mut neighbor.neighbors[level];
                    if !layer.contains(&key) {
                        layer.push(key);
                    }
                    if layer.len() <= max {
                        continue;
                    }
                    layer.clone()
                }
                _ => continue,
            };

            let pruned = self.closest_links(neighbor_key, &links, max);
            if let Some(neighbor) = self.nodes.get_mut(&neighbor_key) {
                neighbor.neighbors[level] = pruned;
            }
        }
    }

    fn closest_links(&self, origin: u64, links: &[u64], max: usize) -> Vec<u64> {
        let Some(origin_node) = self.nodes.get(&origin) else {
            return links.to_vec();
        };

        let mut scored: Vec<(u64, f32)> = links
            .iter()
            .filter_map(|link| {
                self.nodes
                    .get(link)
                    .map(|n| (*link, self.distance(&origin_node.vector, &n.vector)))
            })
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.into_iter().take(max).map(|(link, _)| link).collect()
    }

    /// Remove a vector from the index
    pub fn remove(&mut self, key: u64) -> bool {
        let Some(node) = self.nodes.remove(&key) else {
            return false;
        };

        for (level, layer) in node.neighbors.iter().enumerate() {
            for neighbor_key in layer {
                if let Some(neighbor) = self.nodes.get_mut(neighbor_key) {
                    if let Some(links) = neighbor.neighbors.get_mut(level) {
                        links.retain(|n| *n != key);
                    }
                }
            }
        }

        if self.entry_point == Some(key) {
            let next = self
                .nodes
                .iter()
                .max_by_key(|(k, n)| (n.level, **k))
                .map(|(k, n)| (*k, n.level));
            self.entry_point = next.map(|(k, _)| k);
            self.current_max_level = next.map(|(_, level)| level).unwrap_or(0);
        }

        true
    }

    /// Remove many vectors at once
    ///
    /// Once the graph is in use for queries, removals can leave regions of it
    /// poorly connected, so the links are rebuilt from the surviving vectors.
    pub fn remove_many(&mut self, keys: &[u64]) -> usize {
        let removed = keys.iter().filter(|key| self.remove(**key)).count();
        if removed > 0 && self.is_approximate() {
            self.rebuild();
        }
        removed
    }

    /// Rebuild the graph links from the stored vectors
    fn rebuild(&mut self) {
        let mut nodes: Vec<(u64, Node)> = self.nodes.drain().collect();
        nodes.sort_by_key(|(key, _)| *key);
        self.entry_point = None;
        self.current_max_level = 0;

        for (key, node) in nodes {
            self.link(key, node.vector, node.created_at);
        }
    }
}

/// Pseudo-random float in [0, 1) for level selection
fn rand_float() -> f32 {
    use std::cell::Cell;
    use std::time::SystemTime;

    thread_local! {
        static STATE: Cell<u64> = Cell::new(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(12345)
        );
    }

    STATE.with(|state| {
        // xorshift64*
        let mut x = state.get().max(1);
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        state.set(x);
        (x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 40) as f32 / (1u64 << 24) as f32
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(micros: i64) -> Timestamp {
        Timestamp::from_micros(1_700_000_000_000_000 + micros)
    }

    fn create_test_vectors() -> Vec<(u64, Vec<f32>)> {
        vec![
            (1, vec![1.0, 0.0, 0.0]),
            (2, vec![0.9, 0.1, 0.0]),
            (3, vec![0.8, 0.2, 0.0]),
            (4, vec![0.0, 1.0, 0.0]),
            (5, vec![0.0, 0.9, 0.1]),
            (6, vec![0.0, 0.0, 1.0]),
            (7, vec![0.5, 0.5, 0.0]),
            (8, vec![0.5, 0.0, 0.5]),
        ]
    }

    fn filled(config: IndexConfig) -> VectorIndex {
        let mut index = VectorIndex::new(config).unwrap();
        for (key, vec) in create_test_vectors() {
            index.insert(key, vec, ts(key as i64)).unwrap();
        }
        index
    }

    #[test]
    fn test_create_index() {
        let index = VectorIndex::new(IndexConfig::default()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert!(!index.is_approximate());
    }

    #[test]
    fn test_invalid_config() {
        let config = IndexConfig {
            m: 1,
            ..IndexConfig::default()
        };
        assert!(VectorIndex::new(config).is_err());
    }

    #[test]
    fn test_dimension_fixed_by_first_insert() {
        let mut index = VectorIndex::new(IndexConfig::small()).unwrap();
        index.insert(1, vec![1.0, 0.0, 0.0], ts(1)).unwrap();
        assert_eq!(index.config.dimension, Some(3));

        let result = index.insert(2, vec![1.0, 0.0], ts(2));
        assert!(matches!(result, Err(IndexError::DimensionMismatch { expected: 3, got: 2 })));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_query_dimension_checked() {
        let index = VectorIndex::new(IndexConfig::small().with_dimension(3)).unwrap();
        assert!(index.search(&[1.0, 0.0], 1, None).is_err());
    }

    #[test]
    fn test_search_basic() {
        let index = filled(IndexConfig::small());
        let results = index.search(&[1.0, 0.0, 0.0], 3, None).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].key, 1);
        assert_eq!(results[1].key, 2);
        assert_eq!(results[2].key, 3);
        assert!((results[0].score - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_search_fewer_than_k() {
        let index = filled(IndexConfig::small());
        let results = index.search(&[1.0, 0.0, 0.0], 100, None).unwrap();
        assert_eq!(results.len(), 8);
    }

    #[test]
    fn test_search_empty() {
        let index = VectorIndex::new(IndexConfig::default()).unwrap();
        let results = index.search(&[1.0, 0.0, 0.0], 5, None).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_ties_prefer_most_recent() {
        let mut index = VectorIndex::new(IndexConfig::small()).unwrap();
        index.insert(1, vec![1.0, 0.0], ts(10)).unwrap();
        index.insert(2, vec![1.0, 0.0], ts(30)).unwrap();
        index.insert(3, vec![1.0, 0.0], ts(20)).unwrap();

        let keys: Vec<u64> = index
            .search(&[1.0, 0.0], 3, None)
            .unwrap()
            .into_iter()
            .map(|h| h.key)
            .collect();
        assert_eq!(keys, vec![2, 3, 1]);
    }

    #[test]
    fn test_since_filter() {
        let index = filled(IndexConfig::small());

        let results = index.search(&[1.0, 0.0, 0.0], 3, Some(ts(4))).unwrap();
        assert!(results.iter().all(|h| h.key >= 4));
        // 7 and 8 tie on score; 8 is more recent
        assert_eq!(results[0].key, 8);
        assert_eq!(results[1].key, 7);

        let none = index.search(&[1.0, 0.0, 0.0], 3, Some(ts(100))).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_insert_replaces_existing_key() {
        let mut index = filled(IndexConfig::small());
        index.insert(1, vec![0.0, 0.0, 1.0], ts(1)).unwrap();

        assert_eq!(index.len(), 8);
        assert_eq!(index.nodes[&1].vector, vec![0.0, 0.0, 1.0]);
        let results = index.search(&[1.0, 0.0, 0.0], 1, None).unwrap();
        assert_eq!(results[0].key, 2);
    }

    #[test]
    fn test_remove() {
        let mut index = VectorIndex::new(IndexConfig::small()).unwrap();
        index.insert(1, vec![1.0, 0.0, 0.0], ts(1)).unwrap();
        index.insert(2, vec![0.0, 1.0, 0.0], ts(2)).unwrap();

        assert!(index.remove(1));
        assert!(!index.remove(1));
        assert_eq!(index.len(), 1);
        assert!(!index.nodes.contains_key(&1));
        assert!(index.nodes.contains_key(&2));

        let results = index.search(&[1.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, 2);
    }

    #[test]
    fn test_euclidean_metric() {
        let mut index =
            VectorIndex::new(IndexConfig::small().with_metric(SimilarityMetric::Euclidean)).unwrap();
        index.insert(1, vec![1.0, 0.0, 0.0], ts(1)).unwrap();
        index.insert(2, vec![2.0, 0.0, 0.0], ts(2)).unwrap();

        // Same direction, so cosine would tie; euclidean prefers the nearer one
        let results = index.search(&[1.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(results[0].key, 1);
    }

    fn circle_index(count: u64) -> VectorIndex {
        let config = IndexConfig::default().with_exact_search_threshold(0);
        let mut index = VectorIndex::new(config).unwrap();
        for i in 0..count {
            let angle = (i as f32) * std::f32::consts::PI / (count as f32 / 2.0);
            index
                .insert(i, vec![angle.cos(), angle.sin(), 0.0], ts(i as i64))
                .unwrap();
        }
        index
    }

    #[test]
    fn test_approximate_search_quality() {
        let index = circle_index(200);
        assert!(index.is_approximate());

        let results = index.search(&[1.0, 0.0, 0.0], 5, None).unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].key, 0);
        for result in &results {
            assert!(result.score > 0.9);
        }
    }

    #[test]
    fn test_approximate_matches_exact_top_hit() {
        let index = circle_index(300);
        for angle in [0.3f32, 1.7, 2.9, 4.4] {
            let query = [angle.cos(), angle.sin(), 0.0];
            let approx = index.search(&query, 1, None).unwrap();
            let exact = index.exact_search(&query, 1, None);
            assert_eq!(approx[0].key, exact[0].key);
        }
    }

    #[test]
    fn test_approximate_since_falls_back_to_exact() {
        let index = circle_index(200);

        // Only the last few vectors survive the filter, all far from the query
        let results = index.search(&[1.0, 0.0, 0.0], 3, Some(ts(197))).unwrap();
        let keys: Vec<u64> = results.iter().map(|h| h.key).collect();
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().all(|k| *k >= 197));
        assert_eq!(keys[0], 199);
    }

    #[test]
    fn test_remove_many_rebuilds_graph() {
        let mut index = circle_index(200);
        let odd: Vec<u64> = (0..200).filter(|k| k % 2 == 1).collect();

        assert_eq!(index.remove_many(&odd), 100);
        assert_eq!(index.len(), 100);

        let results = index.search(&[1.0, 0.0, 0.0], 3, None).unwrap();
        assert_eq!(results[0].key, 0);
        assert!(results.iter().all(|h| h.key % 2 == 0));
    }
}
