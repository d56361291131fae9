//! Endpoint descriptors and the catalog file they are loaded from
//!
//! The catalog is a JSON array. Only `resource`, `action` and `data_source`
//! are required; every label has the default used by the upstream API.
//!
//! ```json
//! [
//!   {
//!     "resource": "/api/v1/geral/clientes/",
//!     "action": "ListarClientes",
//!     "params": { "registros_por_pagina": 100 },
//!     "data_source": "clientes_cadastro"
//!   },
//!   {
//!     "resource": "/api/v1/financas/extrato/",
//!     "action": "ListarExtrato",
//!     "data_source": "listaMovimentos",
//!     "pagination_type": "date_range",
//!     "depends_on": "contacorrente"
//!   }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{IngestError, Result};
use crate::pagination::{FailurePolicy, Strategy};

pub const DEFAULT_PAGINATION_TYPE: &str = "per_page";
pub const DEFAULT_PAGE_LABEL: &str = "pagina";
pub const DEFAULT_TOTAL_OF_PAGES_LABEL: &str = "total_de_paginas";
pub const DEFAULT_RECORDS_LABEL: &str = "registros";
pub const DEFAULT_DEPENDS_ON_COLUMN: &str = "nCodCC";
pub const DEFAULT_PERIOD_START_LABEL: &str = "dPeriodoInicial";
pub const DEFAULT_PERIOD_END_LABEL: &str = "dPeriodoFinal";

/// One remote endpoint and how to paginate it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointDescriptor {
    /// Path appended to the base URL, e.g. `/api/v1/geral/clientes/`
    #[serde(alias = "resources")]
    pub resource: String,

    /// Remote procedure name sent as `call`
    pub action: String,

    /// Base request parameters, copied per request
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Response field holding the record list
    pub data_source: String,

    /// Strategy tag: `per_page` or `date_range`
    #[serde(default = "default_pagination_type")]
    pub pagination_type: String,

    #[serde(default = "default_page_label")]
    pub page_label: String,

    #[serde(default = "default_total_of_pages_label")]
    pub total_of_pages_label: String,

    #[serde(default = "default_records_label")]
    pub records_label: String,

    /// Table whose distinct dimension values expand a date-range run
    #[serde(default)]
    pub depends_on: Option<String>,

    #[serde(default = "default_depends_on_column")]
    pub depends_on_column: String,

    #[serde(default = "default_period_start_label")]
    pub period_start_label: String,

    #[serde(default = "default_period_end_label")]
    pub period_end_label: String,

    /// Overrides the strategy's default failure policy
    #[serde(default)]
    pub failure_policy: Option<FailurePolicy>,
}

fn default_pagination_type() -> String {
    DEFAULT_PAGINATION_TYPE.to_string()
}

fn default_page_label() -> String {
    DEFAULT_PAGE_LABEL.to_string()
}

fn default_total_of_pages_label() -> String {
    DEFAULT_TOTAL_OF_PAGES_LABEL.to_string()
}

fn default_records_label() -> String {
    DEFAULT_RECORDS_LABEL.to_string()
}

fn default_depends_on_column() -> String {
    DEFAULT_DEPENDS_ON_COLUMN.to_string()
}

fn default_period_start_label() -> String {
    DEFAULT_PERIOD_START_LABEL.to_string()
}

fn default_period_end_label() -> String {
    DEFAULT_PERIOD_END_LABEL.to_string()
}

impl EndpointDescriptor {
    /// Descriptor with every optional field at its default
    pub fn new(
        resource: impl Into<String>,
        action: impl Into<String>,
        data_source: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            params: Map::new(),
            data_source: data_source.into(),
            pagination_type: default_pagination_type(),
            page_label: default_page_label(),
            total_of_pages_label: default_total_of_pages_label(),
            records_label: default_records_label(),
            depends_on: None,
            depends_on_column: default_depends_on_column(),
            period_start_label: default_period_start_label(),
            period_end_label: default_period_end_label(),
            failure_policy: None,
        }
    }

    /// Resolve the strategy tag
    pub fn strategy(&self) -> Result<Strategy> {
        self.pagination_type.parse()
    }

    /// Failure policy for this endpoint, falling back to the strategy default
    pub fn effective_failure_policy(&self, strategy: Strategy) -> FailurePolicy {
        self.failure_policy
            .unwrap_or_else(|| strategy.default_failure_policy())
    }
}

/// The set of endpoints known to a run
#[derive(Debug, Clone, Default)]
pub struct EndpointCatalog {
    endpoints: Vec<EndpointDescriptor>,
}

impl EndpointCatalog {
    pub fn new(endpoints: Vec<EndpointDescriptor>) -> Self {
        Self { endpoints }
    }

    /// Load a catalog from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let endpoints: Vec<EndpointDescriptor> = serde_json::from_str(content)?;
        Ok(Self { endpoints })
    }

    pub fn all(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub fn find_by_action(&self, action: &str) -> Result<&EndpointDescriptor> {
        self.endpoints
            .iter()
            .find(|e| e.action == action)
            .ok_or_else(|| IngestError::EndpointNotFound(format!("action '{}'", action)))
    }

    /// Every endpoint served by `resource`; several actions may share one path
    pub fn find_by_resource(&self, resource: &str) -> Result<Vec<&EndpointDescriptor>> {
        let found: Vec<&EndpointDescriptor> = self
            .endpoints
            .iter()
            .filter(|e| e.resource == resource)
            .collect();
        if found.is_empty() {
            return Err(IngestError::EndpointNotFound(format!("resource '{}'", resource)));
        }
        Ok(found)
    }
}
