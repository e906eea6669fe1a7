// mcp-bridge -- users
//! User records read straight from the database: tolerant row marshaling,
//! keyword search and summary statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::db::{JsonRow, SqlStore};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub department: String,
    pub age: i64,
    pub salary: f64,
}

impl User {
    /// Missing or unparsable columns fall back to zero / empty.
    pub fn from_row(row: &JsonRow) -> Self {
        Self {
            id: int_field(row.get("id")),
            name: text_field(row.get("name")),
            email: text_field(row.get("email")),
            department: text_field(row.get("department")),
            age: int_field(row.get("age")),
            salary: float_field(row.get("salary")),
        }
    }

    fn email_domain(&self) -> Option<&str> {
        let mut parts = self.email.split('@');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(domain), None) if !domain.is_empty() => Some(domain),
            _ => None,
        }
    }
}

fn int_field(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn float_field(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn text_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

// ── Queries ─────────────────────────────────────────────────────────────────

pub async fn load_users(store: &SqlStore, table: &str) -> Result<Vec<User>, sqlx::Error> {
    let rows = store.query_rows(table).await?;
    Ok(rows.iter().map(User::from_row).collect())
}

pub async fn load_user(store: &SqlStore, table: &str, id: i64) -> Result<Option<User>, sqlx::Error> {
    Ok(store
        .query_row_by_id(table, id)
        .await?
        .as_ref()
        .map(User::from_row))
}

/// Case-insensitive substring match on name, email or department.
pub fn search(users: &[User], keyword: &str) -> Vec<User> {
    let needle = keyword.to_lowercase();
    users
        .iter()
        .filter(|u| {
            u.name.to_lowercase().contains(&needle)
                || u.email.to_lowercase().contains(&needle)
                || u.department.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UserStats {
    pub total_users: usize,
    pub average_age: f64,
    pub average_salary: f64,
    pub departments: BTreeMap<String, usize>,
    pub email_domains: BTreeMap<String, usize>,
}

pub fn compute_stats(users: &[User]) -> UserStats {
    let mut departments = BTreeMap::new();
    let mut email_domains = BTreeMap::new();
    let mut age_sum = 0i64;
    let mut salary_sum = 0.0;

    for user in users {
        age_sum += user.age;
        salary_sum += user.salary;
        if !user.department.is_empty() {
            *departments.entry(user.department.clone()).or_insert(0) += 1;
        }
        if let Some(domain) = user.email_domain() {
            *email_domains.entry(domain.to_string()).or_insert(0) += 1;
        }
    }

    let total = users.len();
    let (average_age, average_salary) = if total > 0 {
        (age_sum as f64 / total as f64, salary_sum / total as f64)
    } else {
        (0.0, 0.0)
    };

    UserStats {
        total_users: total,
        average_age,
        average_salary,
        departments,
        email_domains,
    }
}
