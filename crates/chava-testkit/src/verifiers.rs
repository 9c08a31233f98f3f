//! Reference verifiers for tests and demos.
//!
//! These are pattern checks, not security controls. Each one compiles its
//! patterns once at construction and is then registered as a [`Verifier`].

use chava::{ObligationRegistry, Verdict, Verifier};
use regex::Regex;
use serde_json::Value;

/// Rejects destructive SQL statements and common injection shapes.
pub struct SqlSafe {
    destructive: Vec<Regex>,
    injection: Vec<Regex>,
}

impl SqlSafe {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            destructive: compile(&[
                r"\bdrop\s+table\b",
                r"\btruncate\s+\w+\b",
                r"\balter\s+table\b",
                r"\bdelete\s+from\s+\w+\b",
                r"\bupdate\s+\w+\s+set\b.*\bwhere\s*$",
                r"\bexec\b",
                r"\bsp_\w*",
                r"\binsert\s+into\s+\w+\s+values\b.*\bselect\b",
            ])?,
            injection: compile(&[
                r"';",
                r";\s*(drop|truncate|alter)\b",
                r"\bunion\s+select\b",
                r"'\s*or\s*'[^']*'\s*=\s*'",
                r"--",
            ])?,
        })
    }
}

impl Verifier for SqlSafe {
    fn verify(&self, view: &Value, _scope: &str) -> Verdict {
        let sql = match view {
            Value::Null => return Verdict::fail("no statement at scope"),
            Value::String(s) => s.to_lowercase(),
            other => other.to_string().to_lowercase(),
        };
        let sql = sql.trim();

        if self.destructive.iter().any(|re| re.is_match(sql)) {
            return Verdict::fail("destructive statement");
        }
        if self.injection.iter().any(|re| re.is_match(sql)) {
            return Verdict::fail("injection pattern");
        }
        Verdict::pass()
    }
}

/// Rejects values containing phone numbers, e-mail addresses, SSNs or
/// payment card numbers.
pub struct PiiClean {
    patterns: Vec<(Regex, &'static str)>,
}

impl PiiClean {
    pub fn new() -> Result<Self, regex::Error> {
        let table = [
            (r"\b\d{3}-\d{3}-\d{4}\b", "phone number"),
            (r"\(\d{3}\)\s*\d{3}-\d{4}\b", "phone number"),
            (r"\b\d{10}\b", "phone number"),
            (r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b", "e-mail address"),
            (r"\b\d{3}-\d{2}-\d{4}\b", "SSN"),
            (r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b", "card number"),
        ];
        let patterns = table
            .into_iter()
            .map(|(pattern, label)| Ok((Regex::new(pattern)?, label)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns })
    }
}

impl Verifier for PiiClean {
    fn verify(&self, view: &Value, _scope: &str) -> Verdict {
        let text = match view {
            Value::Null => return Verdict::pass(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        match self.patterns.iter().find(|(re, _)| re.is_match(&text)) {
            Some((_, label)) => Verdict::fail(format!("contains {label}")),
            None => Verdict::pass(),
        }
    }
}

/// Requires an object with an integer `id` and a string `name`.
pub fn schema_ok(view: &Value, _scope: &str) -> Verdict {
    let Some(fields) = view.as_object() else {
        return Verdict::fail("not an object");
    };
    match fields.get("id") {
        Some(id) if id.is_i64() || id.is_u64() => {}
        Some(_) => return Verdict::fail("`id` is not an integer"),
        None => return Verdict::fail("missing `id`"),
    }
    match fields.get("name") {
        Some(Value::String(_)) => Verdict::pass(),
        Some(_) => Verdict::fail("`name` is not a string"),
        None => Verdict::fail("missing `name`"),
    }
}

/// A registry with `sql_safe`, `pii_clean` and `schema_ok`.
pub fn reference_registry() -> Result<ObligationRegistry, regex::Error> {
    Ok(ObligationRegistry::new()
        .with("sql_safe", SqlSafe::new()?)
        .with("pii_clean", PiiClean::new()?)
        .with("schema_ok", schema_ok))
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sql_safe() {
        let v = SqlSafe::new().unwrap();

        assert!(v.verify(&json!("SELECT * FROM users WHERE id=1;"), "").is_pass());
        assert!(!v.verify(&json!("DROP TABLE users;"), "").is_pass());
        assert!(!v.verify(&json!("delete from users"), "").is_pass());
        assert!(!v.verify(&json!("TRUNCATE accounts"), "").is_pass());
        assert!(!v.verify(&json!("SELECT * FROM t WHERE a='' OR '1'='1'"), "").is_pass());
        assert!(!v.verify(&json!("SELECT 1; -- comment"), "").is_pass());
        assert!(!v.verify(&json!("SELECT a FROM t UNION SELECT password FROM u"), "").is_pass());
        assert!(!v.verify(&Value::Null, "").is_pass());
    }

    #[test]
    fn test_pii_clean() {
        let v = PiiClean::new().unwrap();

        assert!(v.verify(&json!("hello world"), "").is_pass());
        assert!(v.verify(&Value::Null, "").is_pass());
        assert!(v.verify(&json!({"city": "Springfield"}), "").is_pass());

        assert_eq!(
            v.verify(&json!("call 555-123-4567"), ""),
            Verdict::fail("contains phone number")
        );
        assert_eq!(
            v.verify(&json!("mail a@example.com"), ""),
            Verdict::fail("contains e-mail address")
        );
        assert_eq!(v.verify(&json!("ssn 123-45-6789"), ""), Verdict::fail("contains SSN"));
        assert_eq!(
            v.verify(&json!("4111 1111 1111 1111"), ""),
            Verdict::fail("contains card number")
        );
        // Non-string values are scanned through their JSON text.
        assert!(!v.verify(&json!({"contact": "bob@example.org"}), "").is_pass());
    }

    #[test]
    fn test_schema_ok() {
        assert!(schema_ok(&json!({"id": 1, "name": "x"}), "").is_pass());
        assert!(!schema_ok(&json!({"id": "1", "name": "x"}), "").is_pass());
        assert!(!schema_ok(&json!({"id": 1.5, "name": "x"}), "").is_pass());
        assert!(!schema_ok(&json!({"id": 1}), "").is_pass());
        assert!(!schema_ok(&json!([1, "x"]), "").is_pass());
    }

    #[test]
    fn test_reference_registry() {
        let registry = reference_registry().unwrap();
        let kinds: Vec<&str> = registry.kinds().collect();
        assert_eq!(kinds, vec!["pii_clean", "schema_ok", "sql_safe"]);
    }
}
