//! Batchplan
//!
//! Batchplan is a production allocation planning engine: it assigns product
//! quantities to resource types over discrete periods by building and solving
//! a mixed-integer linear program, with pluggable solver backends.
//!
//! ```
//! use batchplan::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = ProblemData::builder()
//!     .products(["Classic"])
//!     .resources(["Standard"])
//!     .periods(["Week 1"])
//!     .demand("Classic", "Week 1", 100.0)
//!     .supply("Standard", "Week 1", 120.0)
//!     .unit_cost("Classic", "Standard", 0.25)
//!     .yield_per_unit("Classic", 10.0)
//!     .allow("Classic", "Standard")
//!     .build()?;
//!
//! let report = analyze(&data)?;
//! assert!(report.is_feasible());
//!
//! let manager = SolverManager::new();
//! let mut solver = manager.create_solver(BackendKind::Microlp, true)?;
//! solver.build_minimize_cost_model(&data)?;
//! solver.solve_model()?;
//!
//! let solution = solver.get_solution()?;
//! assert_eq!(solution.quantity("Classic", "Standard", "Week 1"), 100);
//! # Ok(())
//! # }
//! ```

pub mod constraints;
pub mod data;
pub mod feasibility;
pub mod fixtures;
pub mod prelude;
pub mod runner;
pub mod solution;
pub mod solver;
