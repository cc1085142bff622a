use regex::Regex;
use tracing::info;

/// Rewrites non-native constructs into their SQLite equivalents before
/// execution. MySQL and PostgreSQL statements are passed through unmodified
/// because callers author them for those dialects directly.
pub(crate) struct DialectAdapter {
    getdate: Regex,
    top_clause: Regex,
    has_limit: Regex,
}

impl DialectAdapter {
    pub fn new() -> Self {
        Self {
            getdate: Regex::new(r"(?i)GETDATE\(\)").unwrap(),
            top_clause: Regex::new(r"(?i)\bTOP\s+(\d+)\s*").unwrap(),
            has_limit: Regex::new(r"(?i)\bLIMIT\b").unwrap(),
        }
    }

    /// Applies the SQLite rewrite rules in order, once per execution attempt.
    pub fn adapt_for_sqlite(&self, sql: &str) -> String {
        let mut adapted = sql.to_string();

        if self.getdate.is_match(&adapted) {
            let rewritten = self.getdate.replace_all(&adapted, "date('now')").into_owned();
            info!("Adapted GETDATE() for SQLite: {} -> {}", adapted, rewritten);
            adapted = rewritten;
        }

        // TOP n becomes a trailing LIMIT n, but only when the statement does
        // not already carry a LIMIT of its own.
        if !self.has_limit.is_match(&adapted) {
            if let Some(caps) = self.top_clause.captures(&adapted) {
                let limit = caps[1].to_string();
                let stripped = self.top_clause.replace(&adapted, "").into_owned();
                let rewritten = format!("{} LIMIT {}", stripped.trim_end(), limit);
                info!("Adapted TOP clause for SQLite: {} -> {}", adapted, rewritten);
                adapted = rewritten;
            }
        }

        adapted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_becomes_trailing_limit() {
        let adapter = DialectAdapter::new();
        assert_eq!(
            adapter.adapt_for_sqlite("SELECT TOP 5 * FROM t"),
            "SELECT * FROM t LIMIT 5"
        );
    }

    #[test]
    fn top_is_case_insensitive() {
        let adapter = DialectAdapter::new();
        assert_eq!(
            adapter.adapt_for_sqlite("select top 10 name from users"),
            "select name from users LIMIT 10"
        );
    }

    #[test]
    fn existing_limit_suppresses_top_rewrite() {
        let adapter = DialectAdapter::new();
        let sql = "SELECT TOP 5 * FROM t LIMIT 3";
        assert_eq!(adapter.adapt_for_sqlite(sql), sql);
    }

    #[test]
    fn getdate_becomes_date_now() {
        let adapter = DialectAdapter::new();
        assert_eq!(adapter.adapt_for_sqlite("SELECT GETDATE()"), "SELECT date('now')");
        assert_eq!(
            adapter.adapt_for_sqlite("SELECT getdate(), id FROM t"),
            "SELECT date('now'), id FROM t"
        );
    }

    #[test]
    fn both_rules_apply_in_order() {
        let adapter = DialectAdapter::new();
        assert_eq!(
            adapter.adapt_for_sqlite("SELECT TOP 2 GETDATE() FROM t"),
            "SELECT date('now') FROM t LIMIT 2"
        );
    }

    #[test]
    fn plain_statements_pass_through() {
        let adapter = DialectAdapter::new();
        let sql = "SELECT id, name FROM users WHERE id = 1";
        assert_eq!(adapter.adapt_for_sqlite(sql), sql);
    }

    #[test]
    fn top_without_digits_is_left_alone() {
        let adapter = DialectAdapter::new();
        let sql = "SELECT * FROM toppings";
        assert_eq!(adapter.adapt_for_sqlite(sql), sql);
    }
}
