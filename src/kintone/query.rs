//! Structured queries rendered into kintone's query language.

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, String),
    NotEq(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Like(String, String),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn eq(field: &str, value: impl ToString) -> Self {
        Condition::Eq(field.to_string(), value.to_string())
    }

    pub fn not_eq(field: &str, value: impl ToString) -> Self {
        Condition::NotEq(field.to_string(), value.to_string())
    }

    pub fn is_in<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Condition::In(
            field.to_string(),
            values.into_iter().map(|v| v.to_string()).collect(),
        )
    }

    pub fn not_in<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Condition::NotIn(
            field.to_string(),
            values.into_iter().map(|v| v.to_string()).collect(),
        )
    }

    pub fn like(field: &str, value: impl ToString) -> Self {
        Condition::Like(field.to_string(), value.to_string())
    }

    pub fn render(&self) -> String {
        match self {
            Condition::Eq(field, value) => format!("{field} = {}", quote(value)),
            Condition::NotEq(field, value) => format!("{field} != {}", quote(value)),
            Condition::In(field, values) => format!("{field} in ({})", quote_list(values)),
            Condition::NotIn(field, values) => {
                format!("{field} not in ({})", quote_list(values))
            }
            Condition::Like(field, value) => format!("{field} like {}", quote(value)),
            Condition::And(items) => join(items, " and "),
            Condition::Or(items) => join(items, " or "),
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Condition::And(items) | Condition::Or(items) if items.len() > 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A filter over one app. Conditions are combined with `and`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub conditions: Vec<Condition>,
    pub order_by: Vec<(String, SortOrder)>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub total_count: bool,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        self.order_by.push((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_total_count(mut self) -> Self {
        self.total_count = true;
        self
    }

    pub fn render(&self) -> String {
        let mut parts = Vec::new();

        if !self.conditions.is_empty() {
            parts.push(join(&self.conditions, " and "));
        }

        if !self.order_by.is_empty() {
            let clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|(field, order)| match order {
                    SortOrder::Asc => format!("{field} asc"),
                    SortOrder::Desc => format!("{field} desc"),
                })
                .collect();
            parts.push(format!("order by {}", clauses.join(", ")));
        }

        if let Some(limit) = self.limit {
            parts.push(format!("limit {limit}"));
        }
        if let Some(offset) = self.offset {
            parts.push(format!("offset {offset}"));
        }

        parts.join(" ")
    }
}

fn join(items: &[Condition], separator: &str) -> String {
    items
        .iter()
        .map(|item| {
            if item.is_compound() {
                format!("({})", item.render())
            } else {
                item.render()
            }
        })
        .collect::<Vec<_>>()
        .join(separator)
}

fn quote(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

fn quote_list(values: &[String]) -> String {
    values
        .iter()
        .map(|value| quote(value))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_conditions_order_and_paging() {
        let query = RecordQuery::new()
            .filter(Condition::eq("公開ステータス", "公開"))
            .filter(Condition::Or(vec![
                Condition::like("案件名", "Rust"),
                Condition::like("案件詳細", "Rust"),
            ]))
            .order_by("作成日時", SortOrder::Desc)
            .limit(20)
            .offset(40);

        assert_eq!(
            query.render(),
            "公開ステータス = \"公開\" and (案件名 like \"Rust\" or 案件詳細 like \"Rust\") \
             order by 作成日時 desc limit 20 offset 40"
        );
    }

    #[test]
    fn renders_in_lists() {
        let query = RecordQuery::new().filter(Condition::is_in("$id", [3u64, 5, 8]));
        assert_eq!(query.render(), "$id in (\"3\", \"5\", \"8\")");

        let query = RecordQuery::new().filter(Condition::not_in("対応状況", ["見送り"]));
        assert_eq!(query.render(), "対応状況 not in (\"見送り\")");
    }

    #[test]
    fn escapes_quotes_and_backslashes() {
        let condition = Condition::like("案件名", "say \"hi\" \\ bye");
        assert_eq!(condition.render(), "案件名 like \"say \\\"hi\\\" \\\\ bye\"");
    }

    #[test]
    fn empty_query_renders_empty_string() {
        assert_eq!(RecordQuery::new().render(), "");
        assert_eq!(
            RecordQuery::new().order_by("$id", SortOrder::Asc).render(),
            "order by $id asc"
        );
    }

    #[test]
    fn single_item_groups_are_not_parenthesised() {
        let query = RecordQuery::new()
            .filter(Condition::Or(vec![Condition::eq("種別", "退会")]))
            .filter(Condition::not_eq("auth_user_id", ""));
        assert_eq!(query.render(), "種別 = \"退会\" and auth_user_id != \"\"");
    }
}
