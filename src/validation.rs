const MAX_USERNAME_LEN: usize = 64;
const MAX_GAME_TITLE_LEN: usize = 100;

fn is_valid_name_char(c: char, allow_period: bool) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || (allow_period && c == '.')
}

fn validate_name(
    name: &str,
    entity: &str,
    max_len: usize,
    allow_period: bool,
) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{entity} cannot be empty"));
    }
    if name.len() > max_len {
        return Err(format!("{entity} cannot exceed {max_len} characters"));
    }
    if !name.chars().all(|c| is_valid_name_char(c, allow_period)) {
        let mut allowed = "alphanumeric characters, hyphens, and underscores".to_string();
        if allow_period {
            allowed.push_str(", and periods");
        }
        return Err(format!("{entity} can only contain {allowed}"));
    }
    if name.starts_with(['-', '_', '.']) {
        return Err(format!("{entity} cannot start with a special character"));
    }
    Ok(())
}

/// Usernames double as namespaces, so they follow namespace rules.
pub fn validate_username(name: &str) -> Result<(), String> {
    validate_name(name, "Username", MAX_USERNAME_LEN, false)
}

pub fn validate_game_title(title: &str) -> Result<(), String> {
    validate_name(title, "Game name", MAX_GAME_TITLE_LEN, true)
}
