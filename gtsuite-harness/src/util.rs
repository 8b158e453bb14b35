//! Utility functions for the test harness.

use anyhow::Result;

/// Get the OS ID from /etc/os-release file.
/// Returns the value of the ID field, which is the canonical OS identifier.
/// For example: "ubuntu", "opensuse-tumbleweed", "fedora", etc.
pub fn get_host_os_id() -> Option<String> {
    os_release::OsRelease::new().ok().and_then(|info| {
        if info.id.is_empty() {
            None
        } else {
            Some(info.id)
        }
    })
}

/// Writes a diff between two strings to a writer.
pub fn write_diff(
    writer: &mut impl std::io::Write,
    indent: usize,
    left: &str,
    right: &str,
) -> Result<()> {
    use colored::Colorize;

    let indent_str = " ".repeat(indent);

    let left_lines: Vec<&str> = left.lines().collect();
    let right_lines: Vec<&str> = right.lines().collect();

    for d in diff::slice(&left_lines, &right_lines) {
        let formatted = match d {
            diff::Result::Left(l) => std::format!("{indent_str}- {l}").red(),
            diff::Result::Both(l, _) => std::format!("{indent_str}  {l}").bright_black(),
            diff::Result::Right(r) => std::format!("{indent_str}+ {r}").green(),
        };

        writeln!(writer, "{formatted}")?;
    }

    Ok(())
}

/// Extracts the message carried by a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Expands `${name}` placeholders in `input` using `lookup`.
///
/// An opening `${` without a closing brace is kept literally.
pub fn expand_placeholders<E>(
    input: &str,
    mut lookup: impl FnMut(&str) -> Result<String, E>,
) -> Result<String, E> {
    let mut expanded = String::with_capacity(input.len());
    let mut rest = input;

    while let Some((before, after)) = rest.split_once("${") {
        expanded.push_str(before);

        if let Some((name, remainder)) = after.split_once('}') {
            expanded.push_str(&lookup(name)?);
            rest = remainder;
        } else {
            expanded.push_str("${");
            rest = after;
            break;
        }
    }

    expanded.push_str(rest);
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Result<String, String> {
        match name {
            "testdata" => Ok("/data/".into()),
            "ruby" => Ok("ruby".into()),
            other => Err(other.to_owned()),
        }
    }

    #[test]
    fn expands_known_placeholders() {
        assert_eq!(
            expand_placeholders("${testdata}gtruby/gff3.rb", lookup),
            Ok("/data/gtruby/gff3.rb".into())
        );
        assert_eq!(
            expand_placeholders("${ruby} and ${ruby}", lookup),
            Ok("ruby and ruby".into())
        );
        assert_eq!(expand_placeholders("plain", lookup), Ok("plain".into()));
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(
            expand_placeholders("cost: ${5", lookup),
            Ok("cost: ${5".into())
        );
    }

    #[test]
    fn diff_has_no_phantom_trailing_line() {
        let mut buf = vec![];
        write_diff(&mut buf, 2, "x\nz\n", "x\ny\n").unwrap();

        assert_eq!(
            strip_ansi_escapes::strip_str(String::from_utf8(buf).unwrap()),
            "    x\n  - z\n  + y\n"
        );
    }

    #[test]
    fn panic_messages() {
        let payload = std::panic::catch_unwind(|| {
            std::panic::panic_any("static");
        })
        .unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload = std::panic::catch_unwind(|| {
            std::panic::panic_any(String::from("owned"));
        })
        .unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload = std::panic::catch_unwind(|| {
            std::panic::panic_any(7_u8);
        })
        .unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn unknown_placeholder_fails() {
        assert_eq!(
            expand_placeholders("${nope}/x", lookup),
            Err("nope".into())
        );
    }
}
