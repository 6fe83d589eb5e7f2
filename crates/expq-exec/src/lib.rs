//! EXPQ Exec: store interface and exact-decimal query execution
//!
//! ```text
//! QueryRequest → build_where → ExpenseStore → aggregate / bucket / paginate → QueryResult
//! ```

pub mod aggregate;
pub mod error;
pub mod executor;
pub mod predicate;
pub mod record;
pub mod store;

pub use aggregate::{compute_aggregate, decimal_values};
pub use error::{ExecError, StoreError};
pub use executor::run_query;
pub use predicate::{build_where, Bounds, CompanionMatch, ExpenseWhere, OrderBy};
pub use record::{Expense, EXPENSE_FIELDS};
pub use store::{ExpenseStore, MemoryStore};
