use std::error::Error;

#[macro_export]
macro_rules! check {
  ($cond: expr, $prompt: literal $(, $( $params: expr $(,)? )* )? ) => {
    if !$cond {
      tracing::warn!($prompt $(, $( $params, )* )?);
    }
  }
}

/// Quotes `word` for a POSIX shell, leaving plain paths untouched.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@,=%".contains(c));

    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Renders an error with all of its sources, outermost first.
pub fn error_chain(err: &dyn Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }

    rendered
}

pub fn indent_str(string: &str, level: usize) -> String {
    string.lines()
        .map(|line| format!("{:indent$} |  {}", "", line, indent=level))
        .collect::<Vec<_>>()
        .join("\n")
}
