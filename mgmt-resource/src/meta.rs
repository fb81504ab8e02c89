//! `MetaParams`: the meta-configuration every resource carries regardless of kind.

use std::time::Duration;

/// One entry of `MetaParams::sema`: either an anonymous semaphore scoped to the owning
/// resource (`id: None`), or a named, process-wide semaphore shared across resources.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SemaToken {
    pub id: Option<String>,
    pub n: i64,
}

impl SemaToken {
    pub fn anonymous(n: i64) -> Self {
        SemaToken { id: None, n }
    }

    pub fn named(id: impl Into<String>, n: i64) -> Self {
        SemaToken {
            id: Some(id.into()),
            n,
        }
    }

    /// Parses a `":n"` or `"id:n"` token per §4.4's sema grammar.
    pub fn parse(token: &str) -> Option<SemaToken> {
        let (id, n) = token.rsplit_once(':')?;
        let n: i64 = n.parse().ok()?;
        if id.is_empty() {
            Some(SemaToken { id: None, n })
        } else {
            Some(SemaToken {
                id: Some(id.to_string()),
                n,
            })
        }
    }

    /// The key used to order acquisition: lexicographic by id, anonymous entries last.
    /// This total order is what §4.4 relies on to prevent semaphore-acquisition deadlock.
    pub fn order_key(&self) -> (bool, &str) {
        match &self.id {
            Some(id) => (false, id.as_str()),
            None => (true, ""),
        }
    }
}

/// Meta-parameters every resource carries, independent of its kind-specific config.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaParams {
    pub noop: bool,
    pub sema: Vec<SemaToken>,
    /// Token-bucket rate, in checks/sec. `None` disables the limiter (§4.4's `Limit==+Inf`).
    pub limit: Option<f64>,
    pub burst: u32,
    /// Number of CheckApply retries after an error; `-1` means infinite.
    pub retry: i64,
    pub delay: Duration,
}

impl Default for MetaParams {
    fn default() -> Self {
        MetaParams {
            noop: false,
            sema: Vec::new(),
            limit: None,
            burst: 1,
            retry: 0,
            delay: Duration::from_millis(0),
        }
    }
}

impl MetaParams {
    /// Returns the sema tokens in the fixed global acquisition order required by §4.4.
    pub fn ordered_sema(&self) -> Vec<&SemaToken> {
        let mut v: Vec<&SemaToken> = self.sema.iter().collect();
        v.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        v
    }

    /// Whether a further retry is permitted given `attempts_so_far`.
    pub fn may_retry(&self, attempts_so_far: i64) -> bool {
        self.retry < 0 || attempts_so_far <= self.retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_anonymous_token() {
        assert_eq!(SemaToken::parse(":4"), Some(SemaToken::anonymous(4)));
    }

    #[test]
    fn parses_named_token() {
        assert_eq!(SemaToken::parse("net:2"), Some(SemaToken::named("net", 2)));
    }

    #[test]
    fn rejects_malformed_token() {
        assert_eq!(SemaToken::parse("nope"), None);
    }

    #[test]
    fn order_puts_anonymous_last() {
        let mut m = MetaParams::default();
        m.sema = vec![
            SemaToken::anonymous(1),
            SemaToken::named("b", 1),
            SemaToken::named("a", 1),
        ];
        let order: Vec<_> = m.ordered_sema().into_iter().map(|s| s.id.clone()).collect();
        assert_eq!(
            order,
            vec![Some("a".to_string()), Some("b".to_string()), None]
        );
    }

    #[test]
    fn infinite_retry_always_allowed() {
        let mut m = MetaParams::default();
        m.retry = -1;
        assert!(m.may_retry(1_000_000));
    }
}
