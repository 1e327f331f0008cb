//! SQL compiler for query plans
//!
//! Every entity row is joined with its latest non-deleted version as `v`.
//! Values are always bound as parameters; identifiers come from the fixed
//! field set of `query::Field`.

use super::codec::timestamp;
use crate::models::Versionable;
use crate::query::{CompareOp, Field, Predicate, QueryPlan, SortDirection};
use chrono::{DateTime, Utc};
use libsql::Value;

/// Listing and count statements with their parameters
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// Selects the entity ids (as text) of the requested page
    pub select_sql: String,
    pub select_params: Vec<Value>,
    pub count_sql: String,
    pub count_params: Vec<Value>,
}

struct Compiler {
    entity: Versionable,
    now: String,
    params: Vec<Value>,
}

fn entity_id_expr(entity: Versionable) -> &'static str {
    match entity {
        Versionable::Page => "CAST(e.id AS TEXT)",
        Versionable::Element | Versionable::File => "e.id",
    }
}

fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace(['"', '\\'], ""))
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Bind value for a JSON literal
pub fn to_sql_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Compiler {
    fn field(&mut self, field: &Field) -> String {
        let is_page = self.entity == Versionable::Page;

        match field {
            Field::Id => "e.id".to_string(),
            Field::ParentId if is_page => "e.parent_id".to_string(),
            Field::ParentId => "NULL".to_string(),
            Field::Position if is_page => "e.lft".to_string(),
            Field::Position | Field::CreatedAt => "e.created_at".to_string(),
            Field::Lang => "v.lang".to_string(),
            Field::Editor => "v.editor".to_string(),
            Field::Published => "v.published".to_string(),
            Field::PublishAt => "v.publish_at".to_string(),
            Field::Data(key) => {
                self.params.push(Value::Text(json_path(key)));
                "json_extract(v.data, ?)".to_string()
            }
            Field::Aux(key) => {
                self.params.push(Value::Text(json_path(key)));
                "json_extract(v.aux, ?)".to_string()
            }
        }
    }

    fn predicate(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::All(items) if items.is_empty() => "1".to_string(),
            Predicate::Any(items) if items.is_empty() => "0".to_string(),
            Predicate::All(items) => self.join(items, " AND "),
            Predicate::Any(items) => self.join(items, " OR "),
            Predicate::NotDeleted => "e.deleted_at IS NULL".to_string(),
            Predicate::Deleted => "e.deleted_at IS NOT NULL".to_string(),
            Predicate::Effective => {
                self.params.push(Value::Text(self.now.clone()));
                format!(
                    "EXISTS (SELECT 1 FROM versions x WHERE x.versionable_type = '{kind}' \
                     AND x.versionable_id = {id} AND x.deleted_at IS NULL AND x.published = 1 \
                     AND (x.publish_at IS NULL OR x.publish_at <= ?))",
                    kind = self.entity.as_str(),
                    id = entity_id_expr(self.entity),
                )
            }
            Predicate::Compare { field, op, value } => {
                let expr = self.field(field);
                match op {
                    CompareOp::Eq if value.is_null() => format!("{} IS NULL", expr),
                    CompareOp::Eq => {
                        self.params.push(to_sql_value(value));
                        format!("{} = ?", expr)
                    }
                    CompareOp::Prefix => {
                        self.params
                            .push(Value::Text(format!("{}%", escape_like(&text(value)))));
                        format!("{} LIKE ? ESCAPE '\\'", expr)
                    }
                    CompareOp::Contains => {
                        self.params
                            .push(Value::Text(format!("%{}%", escape_like(&text(value)))));
                        format!("{} LIKE ? ESCAPE '\\'", expr)
                    }
                }
            }
            Predicate::In { values, .. } if values.is_empty() => "0".to_string(),
            Predicate::In { field, values } => {
                let expr = self.field(field);
                self.params.extend(values.iter().map(to_sql_value));
                format!("{} IN ({})", expr, vec!["?"; values.len()].join(", "))
            }
            Predicate::IsNull(field) => format!("{} IS NULL", self.field(field)),
            Predicate::NotNull(field) => format!("{} IS NOT NULL", self.field(field)),
        }
    }

    fn join(&mut self, items: &[Predicate], separator: &str) -> String {
        let parts: Vec<String> = items
            .iter()
            .map(|item| format!("({})", self.predicate(item)))
            .collect();
        parts.join(separator)
    }
}

pub fn compile(plan: &QueryPlan, tenant: &str, now: DateTime<Utc>) -> CompiledQuery {
    let entity = plan.entity;
    let from = format!(
        "FROM {table} e LEFT JOIN versions v ON v.id = (\
            SELECT MAX(l.id) FROM versions l WHERE l.versionable_type = '{kind}' \
            AND l.versionable_id = {id} AND l.deleted_at IS NULL)",
        table = entity.table(),
        kind = entity.as_str(),
        id = entity_id_expr(entity),
    );

    let mut compiler = Compiler {
        entity,
        now: timestamp(now),
        params: vec![Value::Text(tenant.to_string())],
    };
    let condition = compiler.predicate(&plan.predicate);
    let count_params = compiler.params.clone();

    let mut order: Vec<String> = plan
        .sort
        .iter()
        .map(|sort| {
            let direction = match sort.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!("{} {}", compiler.field(&sort.field), direction)
        })
        .collect();
    if !plan.sort.iter().any(|sort| sort.field == Field::Id) {
        order.push("e.id ASC".to_string());
    }

    let mut select_params = compiler.params;
    select_params.push(Value::Integer(i64::from(plan.paging.per_page)));
    select_params.push(Value::Integer(plan.paging.offset() as i64));

    CompiledQuery {
        select_sql: format!(
            "SELECT {id} {from} WHERE e.tenant_id = ? AND ({condition}) ORDER BY {order} LIMIT ? OFFSET ?",
            id = entity_id_expr(entity),
            from = from,
            condition = condition,
            order = order.join(", "),
        ),
        select_params,
        count_sql: format!(
            "SELECT COUNT(*) {from} WHERE e.tenant_id = ? AND ({condition})",
            from = from,
            condition = condition,
        ),
        count_params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{build_page_plan, PageFilter, PageLimits, QueryRequest, SortSpec};

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_parameters_follow_placeholders() {
        let request = QueryRequest::new(PageFilter {
            title: Some("Ho".to_string()),
            status: Some(1),
            ..Default::default()
        })
        .sorted_by(SortSpec::desc("name"))
        .page(2, 10);
        let plan = build_page_plan(&request, &PageLimits::default()).unwrap();
        let compiled = compile(&plan, "demo", Utc::now());

        let placeholders = compiled.select_sql.matches('?').count();
        assert_eq!(placeholders, compiled.select_params.len());
        assert_eq!(
            compiled.count_sql.matches('?').count(),
            compiled.count_params.len()
        );

        // tenant, status path + value, title path + pattern, sort path, limit, offset
        assert_eq!(compiled.select_params.len(), 8);
        assert!(matches!(&compiled.select_params[0], Value::Text(t) if t == "demo"));
        assert!(matches!(&compiled.select_params[4], Value::Text(t) if t == "Ho%"));
        assert!(matches!(compiled.select_params[6], Value::Integer(10)));
        assert!(matches!(compiled.select_params[7], Value::Integer(10)));
        assert!(compiled.select_sql.contains("ORDER BY json_extract(v.data, ?) DESC, e.id ASC"));
    }

    #[test]
    fn test_empty_disjunction_matches_nothing() {
        let mut compiler = Compiler {
            entity: Versionable::File,
            now: String::new(),
            params: Vec::new(),
        };
        assert_eq!(compiler.predicate(&Predicate::Any(vec![])), "0");
        assert_eq!(compiler.predicate(&Predicate::All(vec![])), "1");
    }
}
