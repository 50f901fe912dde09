/// Approximate token counting used for sampling budgets
pub trait TokenCounter: Send + Sync {
  fn count_tokens(&self, text: &str) -> usize;
}

/// Four characters per token, rounded up
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenCounter;

const CHARS_PER_TOKEN: usize = 4;

impl TokenCounter for ApproxTokenCounter {
  fn count_tokens(&self, text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_approx_token_counts() {
    let counter = ApproxTokenCounter;
    assert_eq!(counter.count_tokens(""), 0);
    assert_eq!(counter.count_tokens("abc"), 1);
    assert_eq!(counter.count_tokens("abcd"), 1);
    assert_eq!(counter.count_tokens("abcde"), 2);
    // counts characters, not bytes
    assert_eq!(counter.count_tokens("héllo wörld"), 3);
  }
}
