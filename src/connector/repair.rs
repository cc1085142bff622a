use regex::{Captures, Regex};
use tracing::debug;

use crate::error::DbError;

/// How much of the statement a repair pass is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    /// Space out comparison operators, then single-quote bare string
    /// operands in the WHERE clause.
    Conservative,
    /// Space every operator adjacency globally, ignoring clause position
    /// and quoting. Reserved for a second retry tier; see DESIGN.md.
    Aggressive,
}

/// Statement repair invoked after a SQLite syntax failure.
///
/// The executor only ever sees this interface, so a parser-based repairer
/// can be substituted without touching the retry logic.
pub trait SqlRepairer: Send + Sync {
    fn repair(&self, sql: &str, mode: RepairMode) -> Result<String, DbError>;
}

/// Pattern-based repairer matching the comparison-operator heuristics.
///
/// Purely textual: it can misfire on quoted strings containing operator-like
/// substrings, which is accepted behavior for this pass.
pub struct RegexRepairer {
    spaced_op: Regex,
    whitespace: Regex,
    where_kw: Regex,
    comparison: Regex,
    numeric: Regex,
    op_prefix: Regex,
    op_suffix: Regex,
}

impl RegexRepairer {
    // Longest operators first so `<=` never matches as `<` then `=`.
    const OPS: &'static str = "==|!=|<=|>=|<>|=|<|>";

    pub fn new() -> Self {
        Self {
            spaced_op: Regex::new(&format!(r"\s*({})\s*", Self::OPS)).unwrap(),
            whitespace: Regex::new(r"\s+").unwrap(),
            where_kw: Regex::new(r"(?i)\bWHERE\b").unwrap(),
            comparison: Regex::new(&format!(
                r#"(\w+)\s*({})\s*('[^']*'|"[^"]*"|[\w.]+)"#,
                Self::OPS
            ))
            .unwrap(),
            numeric: Regex::new(r"^\d+(\.\d+)?$").unwrap(),
            op_prefix: Regex::new(&format!(r"([^\s=<>!])({})", Self::OPS)).unwrap(),
            op_suffix: Regex::new(&format!(r"({})([^\s=<>!])", Self::OPS)).unwrap(),
        }
    }

    /// Space all comparison operators, then from the first WHERE keyword
    /// onward quote operands that look like bare strings.
    fn conservative(&self, sql: &str) -> String {
        let spaced = self.spaced_op.replace_all(sql, " $1 ");
        let collapsed = self.whitespace.replace_all(&spaced, " ").trim().to_string();

        let Some(clause) = self.where_kw.find(&collapsed) else {
            return collapsed;
        };
        let (head, tail) = collapsed.split_at(clause.start());
        let repaired_tail = self.comparison.replace_all(tail, |caps: &Captures<'_>| {
            let operand = &caps[3];
            if self.needs_quoting(operand) {
                format!("{} {} '{}'", &caps[1], &caps[2], operand)
            } else {
                caps[0].to_string()
            }
        });
        format!("{}{}", head, repaired_tail)
    }

    fn needs_quoting(&self, operand: &str) -> bool {
        if self.numeric.is_match(operand) {
            return false;
        }
        if ["null", "true", "false"]
            .iter()
            .any(|kw| operand.eq_ignore_ascii_case(kw))
        {
            return false;
        }
        let quoted = (operand.starts_with('\'') && operand.ends_with('\''))
            || (operand.starts_with('"') && operand.ends_with('"'));
        !quoted
    }

    /// Insert a space between any operator and the non-whitespace characters
    /// immediately surrounding it, everywhere in the statement.
    fn aggressive(&self, sql: &str) -> String {
        let spaced = self.op_prefix.replace_all(sql, "$1 $2");
        self.op_suffix.replace_all(&spaced, "$1 $2").into_owned()
    }
}

impl Default for RegexRepairer {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlRepairer for RegexRepairer {
    fn repair(&self, sql: &str, mode: RepairMode) -> Result<String, DbError> {
        let repaired = match mode {
            RepairMode::Conservative => self.conservative(sql),
            RepairMode::Aggressive => self.aggressive(sql),
        };
        if repaired != sql {
            debug!("Repaired statement: {} -> {}", sql, repaired);
        }
        Ok(repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conservative(sql: &str) -> String {
        RegexRepairer::new()
            .repair(sql, RepairMode::Conservative)
            .unwrap()
    }

    fn aggressive(sql: &str) -> String {
        RegexRepairer::new()
            .repair(sql, RepairMode::Aggressive)
            .unwrap()
    }

    #[test]
    fn bare_string_operand_is_quoted() {
        assert_eq!(
            conservative("SELECT * FROM users WHERE name = John"),
            "SELECT * FROM users WHERE name = 'John'"
        );
    }

    #[test]
    fn cramped_operator_is_spaced_and_operand_quoted() {
        assert_eq!(
            conservative("SELECT * FROM users WHERE name=John"),
            "SELECT * FROM users WHERE name = 'John'"
        );
    }

    #[test]
    fn numeric_operand_is_untouched() {
        assert_eq!(
            conservative("SELECT * FROM orders WHERE total > 100"),
            "SELECT * FROM orders WHERE total > 100"
        );
        assert_eq!(
            conservative("SELECT * FROM orders WHERE total >= 99.5"),
            "SELECT * FROM orders WHERE total >= 99.5"
        );
    }

    #[test]
    fn keyword_operands_are_untouched() {
        assert_eq!(
            conservative("SELECT * FROM t WHERE active = true"),
            "SELECT * FROM t WHERE active = true"
        );
        assert_eq!(
            conservative("SELECT * FROM t WHERE deleted = NULL"),
            "SELECT * FROM t WHERE deleted = NULL"
        );
    }

    #[test]
    fn quoted_operand_is_untouched() {
        assert_eq!(
            conservative("SELECT * FROM users WHERE name = 'John'"),
            "SELECT * FROM users WHERE name = 'John'"
        );
    }

    #[test]
    fn two_char_operators_survive_spacing() {
        assert_eq!(
            conservative("SELECT * FROM t WHERE a<=5 AND b<>ready"),
            "SELECT * FROM t WHERE a <= 5 AND b <> 'ready'"
        );
    }

    #[test]
    fn statement_without_where_only_gets_spacing() {
        assert_eq!(
            conservative("SELECT 1=1"),
            "SELECT 1 = 1"
        );
    }

    #[test]
    fn multiple_comparisons_each_repair() {
        assert_eq!(
            conservative("SELECT * FROM t WHERE a = x AND b = 2"),
            "SELECT * FROM t WHERE a = 'x' AND b = 2"
        );
    }

    #[test]
    fn aggressive_spaces_everything_including_quotes() {
        assert_eq!(
            aggressive("SELECT * FROM t WHERE a<=b AND note = 'x<y'"),
            "SELECT * FROM t WHERE a <= b AND note = 'x < y'"
        );
    }

    #[test]
    fn aggressive_keeps_already_spaced_text() {
        let sql = "SELECT * FROM t WHERE a <= b";
        assert_eq!(aggressive(sql), sql);
    }

    #[test]
    fn repair_never_mutates_input() {
        let sql = "SELECT * FROM users WHERE name=John".to_string();
        let _ = conservative(&sql);
        assert_eq!(sql, "SELECT * FROM users WHERE name=John");
    }
}
