//! Configuration settings for the MIP solver.

use vertex_core::Options;

/// Node selection strategy for the B&B tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeSelection {
    /// Always select the node with the best (lowest) dual bound.
    #[default]
    BestBound,

    /// Depth-first search (helps find feasible solutions quickly).
    DepthFirst,

    /// Hybrid: alternate between diving and best-bound.
    Hybrid {
        /// How often to dive (every N nodes).
        dive_freq: usize,
    },
}

/// MIP solver settings.
#[derive(Debug, Clone)]
pub struct MipSettings {
    // === Termination criteria ===
    /// Maximum number of nodes to explore.
    pub max_nodes: u64,

    /// Time limit in seconds (None = unlimited).
    pub time_limit: Option<f64>,

    /// Relative optimality gap tolerance.
    /// Stop when (incumbent - bound) / |incumbent| <= mip_rel_gap.
    pub mip_rel_gap: f64,

    /// Absolute optimality gap tolerance.
    pub mip_abs_gap: f64,

    /// Integer feasibility tolerance.
    /// A value is integral if |x - round(x)| <= integrality_tolerance.
    pub integrality_tolerance: f64,

    // === Search strategy ===
    /// Samples per direction before a column's pseudocost is trusted
    /// without blending.
    pub pseudocost_reliability: u32,

    /// Node selection strategy.
    pub node_selection: NodeSelection,

    // === Solver settings ===
    /// Options for the LP relaxation engine.
    pub lp_options: Options,

    // === Output ===
    /// Log frequency (report every N nodes).
    pub log_freq: u64,
}

impl Default for MipSettings {
    fn default() -> Self {
        Self {
            max_nodes: 1_000_000,
            time_limit: None,
            mip_rel_gap: 1e-4,
            mip_abs_gap: 1e-6,
            integrality_tolerance: 1e-6,
            pseudocost_reliability: 8,
            node_selection: NodeSelection::default(),
            lp_options: Options::default(),
            log_freq: 100,
        }
    }
}

impl MipSettings {
    /// Set the time limit in seconds.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    /// Set the maximum node count.
    pub fn with_max_nodes(mut self, nodes: u64) -> Self {
        self.max_nodes = nodes;
        self
    }

    /// Set the relative gap tolerance.
    pub fn with_rel_gap(mut self, gap: f64) -> Self {
        self.mip_rel_gap = gap;
        self
    }

    /// Return a copy with pathological values clamped.
    pub fn clamped(&self) -> Self {
        let mut s = self.clone();
        s.mip_rel_gap = s.mip_rel_gap.clamp(0.0, 1.0);
        s.mip_abs_gap = s.mip_abs_gap.max(0.0);
        s.integrality_tolerance = s.integrality_tolerance.clamp(1e-12, 0.4);
        s.pseudocost_reliability = s.pseudocost_reliability.max(1);
        s.max_nodes = s.max_nodes.max(1);
        s.lp_options = s.lp_options.clamped();
        s
    }
}
