use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use templatebot_core::catalog::{
    FieldSpec, MenuGroup, TemplateClass, TemplateDefinition, TemplateKind,
};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    kind: Option<TemplateKind>,
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TemplateListing {
    pub git_ref: String,
    pub commit: String,
    pub kind: TemplateKind,
    pub groups: Vec<MenuGroup>,
}

/// GET /templates?kind=project|file&ref=<git ref>: the selection menu for
/// one template kind, grouped and ordered for display.
pub async fn list_templates(
    State(app): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<TemplateListing>, AppError> {
    let git_ref = query.git_ref.unwrap_or_else(|| app.default_ref.clone());
    let kind = query.kind.unwrap_or(TemplateKind::Project);
    let (checkout, catalog) = app.cache().catalog(&git_ref).await?;
    Ok(Json(TemplateListing {
        git_ref,
        commit: checkout.commit,
        kind,
        groups: catalog.menu(kind),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefQuery {
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,
}

/// A template as shown to clients. The checkout path stays on the server.
#[derive(Debug, Serialize)]
pub struct TemplateSummary {
    pub name: String,
    pub kind: TemplateKind,
    pub class: TemplateClass,
    pub group: String,
    pub display_name: String,
    pub dialog_title: String,
    pub fields: Vec<FieldSpec>,
}

impl From<TemplateDefinition> for TemplateSummary {
    fn from(t: TemplateDefinition) -> Self {
        Self {
            name: t.name,
            kind: t.kind,
            class: t.class,
            group: t.group,
            display_name: t.display_name,
            dialog_title: t.dialog_title,
            fields: t.fields,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TemplateDetail {
    pub git_ref: String,
    pub commit: String,
    pub configurable: bool,
    pub template: TemplateSummary,
}

/// GET /templates/{name}?ref=<git ref>: one template's dialog fields.
pub async fn get_template(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<RefQuery>,
) -> Result<Json<TemplateDetail>, AppError> {
    let git_ref = query.git_ref.unwrap_or_else(|| app.default_ref.clone());
    let (checkout, template) = app.cache().template(&git_ref, &name).await?;
    Ok(Json(TemplateDetail {
        git_ref,
        commit: checkout.commit,
        configurable: template.is_configurable(),
        template: template.into(),
    }))
}
