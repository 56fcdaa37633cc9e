use crate::domain::model::Project;
use crate::domain::ports::CatalogStore;
use crate::utils::error::{PlannerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Table {
    rows: HashMap<Uuid, Project>,
    insertion_order: Vec<Uuid>,
}

/// Catalog store kept in process memory, with optimistic locking on writes.
#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    table: Arc<RwLock<Table>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn persist(table: &mut Table, mut project: Project) -> Result<Project> {
        project.validate()?;
        let now = Utc::now();

        match table.rows.get(&project.id) {
            Some(existing) => {
                if existing.version != project.version {
                    return Err(PlannerError::OptimisticLock {
                        id: project.id,
                        expected: existing.version,
                        actual: project.version,
                    });
                }
                project.version = existing.version.map(|v| v + 1).or(Some(0));
                project.audit.created_at = existing.audit.created_at.or(Some(now));
                project.audit.updated_at = Some(now);
            }
            None => {
                if project.version.is_some() {
                    return Err(PlannerError::OptimisticLock {
                        id: project.id,
                        expected: None,
                        actual: project.version,
                    });
                }
                project.version = Some(0);
                project.audit.created_at = Some(now);
                project.audit.updated_at = Some(now);
                table.insertion_order.push(project.id);
            }
        }

        table.rows.insert(project.id, project.clone());
        Ok(project)
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn find_all(&self) -> Result<Vec<Project>> {
        let table = self.table.read().await;
        Ok(table
            .insertion_order
            .iter()
            .filter_map(|id| table.rows.get(id).cloned())
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn save(&self, project: Project) -> Result<Project> {
        let mut table = self.table.write().await;
        Self::persist(&mut table, project)
    }

    /// Saves the batch atomically: a conflict on any project leaves the table
    /// untouched.
    async fn save_all(&self, projects: Vec<Project>) -> Result<Vec<Project>> {
        let mut table = self.table.write().await;
        let mut staged = Table {
            rows: table.rows.clone(),
            insertion_order: table.insertion_order.clone(),
        };

        let saved = projects
            .into_iter()
            .map(|project| Self::persist(&mut staged, project))
            .collect::<Result<Vec<_>>>()?;

        *table = staged;
        Ok(saved)
    }
}

#[derive(Debug, Deserialize)]
struct ProjectRow {
    name: String,
    required_capital: Decimal,
    profit: Decimal,
}

/// Reads `name,required_capital,profit` rows into fresh, unsaved projects.
pub fn load_projects_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Project>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut projects = Vec::new();
    for (line, row) in reader.deserialize::<ProjectRow>().enumerate() {
        let row = row?;
        let project = Project::create_new(row.name, row.required_capital, row.profit).map_err(
            |e| PlannerError::InvalidProject {
                message: format!("row {}: {}", line + 1, e),
            },
        )?;
        projects.push(project);
    }

    tracing::debug!(count = projects.len(), "Loaded projects from CSV");
    Ok(projects)
}
