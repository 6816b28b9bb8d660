//! Compiled SQL normalization.
//!
//! Rewrites compiled SQL so that differences which are expected between two
//! build targets (schema names, per-compilation batch metadata, comments,
//! trailing whitespace) disappear, leaving only semantic differences.
//!
//! Comment stripping is regex based, not a lexer: a `--` or `/*` inside a
//! string literal is treated as a comment opener.

use std::sync::LazyLock;

use regex::Regex;

/// Placeholder substituted for the per-target schema name.
pub const SCHEMA_PLACEHOLDER: &str = "__SCHEMA__";

const QUOTED_PLACEHOLDER: &str = "\"__SCHEMA__\"";

static BLOCK_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static LINE_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"--[^\n]*").unwrap());

static BATCH_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cast\(\s*'[0-9a-f-]+'\s+as\s+varchar\s*\)\s+as\s+dbt_batch_id\b").unwrap()
});

static BATCH_TS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cast\(\s*'[^']+'\s+as\s+timestamp\s*\)\s+as\s+dbt_batch_ts\b").unwrap()
});

static TRAILING_WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+(\r?\n)").unwrap());

const BATCH_ID_CANONICAL: &str = "cast('__BATCH_ID__' as varchar) as dbt_batch_id";
const BATCH_TS_CANONICAL: &str = "cast('__BATCH_TS__' as timestamp) as dbt_batch_ts";

/// Remove `/* ... */` and `-- ...` comments.
///
/// Block removal repeats until nothing changes, since removing one comment can
/// join the halves of another opener (`//*a*/* x */`).
pub fn strip_sql_comments(sql: &str) -> String {
    let mut without_blocks = sql.to_string();
    loop {
        let next = BLOCK_COMMENT_RE.replace_all(&without_blocks, "");
        if next == without_blocks {
            break;
        }
        without_blocks = next.into_owned();
    }
    LINE_COMMENT_RE.replace_all(&without_blocks, "").into_owned()
}

/// Normalizer bound to one build target's database and schema.
#[derive(Debug, Clone)]
pub struct SqlNormalizer {
    qualified_prefix: Option<(Regex, String)>,
    quoted_schema: Option<Regex>,
    strip_batch_metadata: bool,
}

impl SqlNormalizer {
    /// Build a normalizer for `db_name`/`schema_name`.
    ///
    /// Schema rewriting is anchored to the exact `db.schema.` and `"schema"`
    /// reference shapes; an empty name disables the corresponding rewrite.
    pub fn new(db_name: &str, schema_name: &str) -> Self {
        let qualified_prefix = (!db_name.is_empty() && !schema_name.is_empty()).then(|| {
            let pattern = format!(
                r"\b{}\.{}\.",
                regex::escape(db_name),
                regex::escape(schema_name)
            );
            let replacement = format!("{db_name}.{SCHEMA_PLACEHOLDER}.");
            (compile_literal_pattern(&pattern), replacement)
        });
        let quoted_schema = (!schema_name.is_empty())
            .then(|| compile_literal_pattern(&format!("\"{}\"", regex::escape(schema_name))));

        Self {
            qualified_prefix,
            quoted_schema,
            strip_batch_metadata: true,
        }
    }

    /// Keep batch id / timestamp literals as compiled.
    pub fn keep_batch_metadata(mut self) -> Self {
        self.strip_batch_metadata = false;
        self
    }

    pub fn normalize(&self, sql: &str) -> String {
        let mut normalized = strip_sql_comments(sql);

        if let Some((re, replacement)) = &self.qualified_prefix {
            normalized = re
                .replace_all(&normalized, regex::NoExpand(replacement))
                .into_owned();
        }
        if let Some(re) = &self.quoted_schema {
            normalized = re
                .replace_all(&normalized, regex::NoExpand(QUOTED_PLACEHOLDER))
                .into_owned();
        }

        if self.strip_batch_metadata {
            normalized = BATCH_ID_RE
                .replace_all(&normalized, regex::NoExpand(BATCH_ID_CANONICAL))
                .into_owned();
            normalized = BATCH_TS_RE
                .replace_all(&normalized, regex::NoExpand(BATCH_TS_CANONICAL))
                .into_owned();
        }

        TRAILING_WS_RE.replace_all(&normalized, "$1").into_owned()
    }
}

/// Compile a pattern built only from escaped literals and fixed syntax.
fn compile_literal_pattern(pattern: &str) -> Regex {
    Regex::new(pattern).expect("pattern built from escaped literals compiles")
}

/// Normalize with a one-off normalizer.
pub fn normalize_sql(sql: &str, db_name: &str, schema_name: &str) -> String {
    SqlNormalizer::new(db_name, schema_name).normalize(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sql_comments() {
        let sql = "select 1 -- target.name\n/* multi\nline */from t";
        assert_eq!(strip_sql_comments(sql), "select 1 \nfrom t");
    }

    #[test]
    fn test_block_comment_is_non_greedy() {
        let sql = "/* a */ select 1 /* b */";
        assert_eq!(strip_sql_comments(sql), " select 1 ");
    }

    #[test]
    fn test_qualified_prefix_replaced() {
        let sql = "select * from tpch.base.orders join tpch.base.lineitem using (k)";
        let out = normalize_sql(sql, "tpch", "base");
        assert_eq!(
            out,
            "select * from tpch.__SCHEMA__.orders join tpch.__SCHEMA__.lineitem using (k)"
        );
    }

    #[test]
    fn test_quoted_schema_replaced() {
        let sql = r#"select * from "tpch"."current"."orders""#;
        let out = normalize_sql(sql, "tpch", "current");
        assert_eq!(out, r#"select * from "tpch"."__SCHEMA__"."orders""#);
    }

    #[test]
    fn test_window_frame_keyword_untouched() {
        let sql = "sum(x) over (order by d rows between unbounded preceding and current row)\n\
                   from tpch.current.orders";
        let out = normalize_sql(sql, "tpch", "current");
        assert!(out.contains("and current row)"));
        assert!(out.contains("tpch.__SCHEMA__.orders"));

        let upper = "SUM(x) OVER (ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW)";
        assert_eq!(normalize_sql(upper, "tpch", "CURRENT"), upper);
    }

    #[test]
    fn test_schema_substring_of_larger_token_untouched() {
        let sql = "select * from tpch.base_archive.orders, tpch.database.x";
        assert_eq!(normalize_sql(sql, "tpch", "base"), sql);
    }

    #[test]
    fn test_regex_metacharacters_in_names_are_literal() {
        // `.` in the db name must not act as a wildcard.
        let sql = "select * from tpchXxXbase.orders";
        assert_eq!(normalize_sql(sql, "tpch.x", "base"), sql);

        assert_eq!(
            normalize_sql("select * from my.db.dev_1.orders", "db", "dev_1"),
            "select * from my.db.__SCHEMA__.orders"
        );
    }

    #[test]
    fn test_empty_names_disable_schema_rewrite() {
        let sql = "select * from tpch.base.orders where \"base\" = 1";
        assert_eq!(
            normalize_sql(sql, "", "base"),
            "select * from tpch.base.orders where \"__SCHEMA__\" = 1"
        );
        assert_eq!(normalize_sql(sql, "tpch", ""), sql);
    }

    #[test]
    fn test_batch_metadata_replaced() {
        let sql = "select cast('3f1c2a9e-1111-4b2b-9c3d-0123456789ab' as varchar) as dbt_batch_id,\n\
                   cast('2024-05-01 12:00:00.123456+00:00' as timestamp) as dbt_batch_ts";
        let out = normalize_sql(sql, "tpch", "base");
        assert!(out.contains("cast('__BATCH_ID__' as varchar) as dbt_batch_id"));
        assert!(out.contains("cast('__BATCH_TS__' as timestamp) as dbt_batch_ts"));
    }

    #[test]
    fn test_keep_batch_metadata() {
        let sql = "cast('abc-123' as varchar) as dbt_batch_id";
        let out = SqlNormalizer::new("tpch", "base")
            .keep_batch_metadata()
            .normalize(sql);
        assert_eq!(out, sql);
    }

    #[test]
    fn test_trailing_whitespace_stripped() {
        let sql = "select 1   \nfrom t\t\r\nwhere x  ";
        assert_eq!(normalize_sql(sql, "", ""), "select 1\nfrom t\r\nwhere x  ");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let sql = "-- header\nselect cast('ab12-cd' as varchar) as dbt_batch_id,  \n\
                   cast('2024-01-01' as timestamp) as dbt_batch_ts\n\
                   from tpch.base.orders join \"base\".\"x\" /* c */ on true \n\
                   rows between unbounded preceding and current row";
        let normalizer = SqlNormalizer::new("tpch", "base");
        let once = normalizer.normalize(sql);
        let twice = normalizer.normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_nested_comment_openers_stripped_in_one_pass() {
        let normalizer = SqlNormalizer::new("tpch", "base");
        let once = normalizer.normalize("select 1 //*a*/* x */ from t");
        assert_eq!(once, "select 1  from t");
        assert_eq!(normalizer.normalize(&once), once);
    }
}
