use serde::{Deserialize, Serialize};

/// Primary key definition preserving column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// Unique constraint definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// Foreign key definition preserving column ordering.
///
/// `columns` and `referenced_columns` are parallel lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

impl ForeignKey {
    /// Constraint name as declared, or the deterministic
    /// `<table>_<col[_col...]>_fkey` form for unnamed constraints.
    pub fn constraint_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}_{}_fkey", table, self.columns.join("_")),
        }
    }
}

/// Table-level constraint definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    PrimaryKey(PrimaryKey),
    ForeignKey(ForeignKey),
    Unique(UniqueConstraint),
}
