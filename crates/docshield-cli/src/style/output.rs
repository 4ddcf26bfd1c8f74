//! Output helpers for consistent styled messages.

use super::colors::SemanticStyle;

/// Prints a success message with a checkmark.
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".success(), msg);
}

/// Prints an error message with an X mark.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".error(), msg);
}

pub fn print_warn(msg: &str) {
    println!("{} {}", "!".warning(), msg.warning());
}

/// Prints a labeled value with indentation.
pub fn print_labeled(key: &str, value: &str) {
    println!("  {}: {}", key.muted(), value);
}

/// Prints one restriction section followed by a blank line.
///
/// An unrestricted section prints a single `unrestricted` line under
/// `label`; otherwise every entry gets its own line.
pub fn print_restriction<I, S>(title: &str, label: &str, unrestricted: bool, entries: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    println!("{}", title.header());
    if unrestricted {
        print_labeled(label, &"unrestricted".success());
    } else {
        for entry in entries {
            print_labeled(label, &entry.as_ref().code());
        }
    }
    print_spacer();
}

/// Prints an empty line for spacing.
pub fn print_spacer() {
    println!();
}
