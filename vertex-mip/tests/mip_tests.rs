//! End-to-end MIP solves through the public API.

use approx::assert_abs_diff_eq;
use sprs::{CsMat, TriMat};
use vertex_mip::{solve_mip, MipSettings, MipStatus};

use vertex_core::{Integrality, LpProblem, ObjSense};

fn csc(nrows: usize, ncols: usize, triplets: &[(usize, usize, f64)]) -> CsMat<f64> {
    let mut tri = TriMat::new((nrows, ncols));
    for &(i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csc()
}

/// minimize -x - y  s.t.  x + 2y <= 7,  4x + y <= 11, x, y >= 0 integer.
fn two_var_mip() -> LpProblem {
    let mut lp = LpProblem::new(
        2,
        2,
        csc(2, 2, &[(0, 0, 1.0), (0, 1, 2.0), (1, 0, 4.0), (1, 1, 1.0)]),
    );
    lp.col_cost = vec![-1.0, -1.0];
    lp.col_lower = vec![0.0, 0.0];
    lp.col_upper = vec![10.0, 10.0];
    lp.row_lower = vec![f64::NEG_INFINITY, f64::NEG_INFINITY];
    lp.row_upper = vec![7.0, 11.0];
    lp.integrality = Some(vec![Integrality::Integer, Integrality::Integer]);
    lp
}

#[test]
fn branch_and_bound_finds_integer_optimum() {
    let solution = solve_mip(&two_var_mip(), &MipSettings::default()).unwrap();
    assert!(solution.status.is_optimal(), "status {:?}", solution.status);
    assert_abs_diff_eq!(solution.objective, -4.0, epsilon = 1e-6);

    // Integer feasibility and constraint satisfaction.
    let x = solution.col_value[0];
    let y = solution.col_value[1];
    assert!((x - x.round()).abs() < 1e-6);
    assert!((y - y.round()).abs() < 1e-6);
    assert!(x + 2.0 * y <= 7.0 + 1e-6);
    assert!(4.0 * x + y <= 11.0 + 1e-6);
    // Branching happened: the relaxation is fractional at the root.
    assert!(solution.nodes_explored > 1);
}

#[test]
fn integral_relaxation_skips_branching() {
    // minimize x + y  s.t.  x + y >= 2, bounds [0, 10]: the relaxation
    // optimum is already integral.
    let mut lp = LpProblem::new(2, 1, csc(1, 2, &[(0, 0, 1.0), (0, 1, 1.0)]));
    lp.col_cost = vec![1.0, 1.0];
    lp.col_lower = vec![0.0, 0.0];
    lp.col_upper = vec![10.0, 10.0];
    lp.row_lower = vec![2.0];
    lp.row_upper = vec![f64::INFINITY];
    lp.integrality = Some(vec![Integrality::Integer, Integrality::Integer]);

    let solution = solve_mip(&lp, &MipSettings::default()).unwrap();
    assert_eq!(solution.status, MipStatus::Optimal);
    assert!((solution.objective - 2.0).abs() < 1e-6);
    assert_eq!(solution.nodes_explored, 1);
}

#[test]
fn continuous_problems_route_to_the_lp_core() {
    let mut lp = two_var_mip();
    lp.integrality = None;
    let solution = solve_mip(&lp, &MipSettings::default()).unwrap();
    assert_eq!(solution.status, MipStatus::Optimal);
    // Relaxation optimum at the constraint intersection.
    assert!((solution.objective + 32.0 / 7.0).abs() < 1e-6);
    assert_eq!(solution.nodes_explored, 0);
}

#[test]
fn infeasible_mip_reports_infeasible() {
    let mut lp = two_var_mip();
    // Demand more than the rows allow.
    lp.col_lower = vec![5.0, 5.0];
    let solution = solve_mip(&lp, &MipSettings::default()).unwrap();
    assert_eq!(solution.status, MipStatus::Infeasible);
    assert!(solution.col_value.is_empty());
}

#[test]
fn maximization_round_trips_the_sense() {
    // maximize x + y over the same constraints: optimum 4.
    let mut lp = two_var_mip();
    lp.col_cost = vec![1.0, 1.0];
    lp.sense = ObjSense::Maximize;
    let solution = solve_mip(&lp, &MipSettings::default()).unwrap();
    assert!(solution.status.is_optimal());
    assert!((solution.objective - 4.0).abs() < 1e-6);
}

#[test]
fn knapsack_with_binaries() {
    // maximize 5a + 4b + 3c  s.t.  2a + 3b + c <= 5, binaries.
    let mut lp = LpProblem::new(
        3,
        1,
        csc(1, 3, &[(0, 0, 2.0), (0, 1, 3.0), (0, 2, 1.0)]),
    );
    lp.col_cost = vec![5.0, 4.0, 3.0];
    lp.col_lower = vec![0.0; 3];
    lp.col_upper = vec![1.0; 3];
    lp.row_lower = vec![f64::NEG_INFINITY];
    lp.row_upper = vec![5.0];
    lp.sense = ObjSense::Maximize;
    lp.integrality = Some(vec![Integrality::Integer; 3]);

    let solution = solve_mip(&lp, &MipSettings::default()).unwrap();
    assert!(solution.status.is_optimal(), "status {:?}", solution.status);
    // Take a and c (weight 3, value 8)... but a, b also fits (weight 5,
    // value 9): optimum picks a + b.
    assert!((solution.objective - 9.0).abs() < 1e-6);
}

#[test]
fn time_limit_returns_promptly_with_status() {
    let settings = MipSettings::default().with_time_limit(0.0);
    let solution = solve_mip(&two_var_mip(), &settings).unwrap();
    // The root may still complete before the first limit check.
    assert!(
        solution.status == MipStatus::TimeLimit || solution.status.is_optimal(),
        "status {:?}",
        solution.status
    );
}

#[test]
fn tightened_gap_settings_still_close_small_trees() {
    let settings = MipSettings::default().with_rel_gap(0.0);
    let solution = solve_mip(&two_var_mip(), &settings).unwrap();
    assert!(solution.status.is_optimal());
    assert!((solution.objective + 4.0).abs() < 1e-6);
}
