use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        )),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

/// Optional string param; absent, null, and blank all read as `None`.
pub fn opt_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    let Some(value) = req.params.get(key) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let Some(raw) = value.as_str() else {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must be a string or null", key),
            None,
        ));
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

#[derive(Debug, Clone)]
pub struct ListQuery {
    pub search: Option<String>,
    pub sort_by: String,
    pub sort_dir: String,
    pub page: usize,
    pub page_size: usize,
}

pub fn parse_list_query(
    req: &Request,
    allowed_sort: &[&str],
    default_sort: &str,
) -> Result<ListQuery, serde_json::Value> {
    let search = match opt_str(req, "search")? {
        Some(s) => Some(s.to_ascii_lowercase()),
        None => None,
    };

    let sort_by = match req.params.get("sort_by") {
        None => default_sort.to_string(),
        Some(v) => {
            let Some(raw) = v.as_str() else {
                return Err(err(&req.id, "bad_params", "sort_by must be a string", None));
            };
            if allowed_sort.iter().any(|a| *a == raw) {
                raw.to_string()
            } else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("sort_by must be one of: {}", allowed_sort.join(", ")),
                    None,
                ));
            }
        }
    };

    let sort_dir = match req.params.get("sort_dir") {
        None => "asc".to_string(),
        Some(v) => {
            let Some(raw) = v.as_str() else {
                return Err(err(&req.id, "bad_params", "sort_dir must be a string", None));
            };
            if raw.eq_ignore_ascii_case("asc") {
                "asc".to_string()
            } else if raw.eq_ignore_ascii_case("desc") {
                "desc".to_string()
            } else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "sort_dir must be one of: asc, desc",
                    None,
                ));
            }
        }
    };

    let page = match req.params.get("page") {
        None => 1,
        Some(v) => match v.as_u64() {
            Some(p) if p >= 1 => p as usize,
            _ => return Err(err(&req.id, "bad_params", "page must be >= 1", None)),
        },
    };

    let page_size = match req.params.get("page_size") {
        None => 50,
        Some(v) => match v.as_u64() {
            Some(s) if (1..=500).contains(&s) => s as usize,
            _ => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "page_size must be in range 1..=500",
                    None,
                ))
            }
        },
    };

    Ok(ListQuery {
        search,
        sort_by,
        sort_dir,
        page,
        page_size,
    })
}

pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Vec<T> {
    let start = (page.saturating_sub(1)) * page_size;
    if start >= items.len() {
        return Vec::new();
    }
    let end = std::cmp::min(start + page_size, items.len());
    items[start..end].to_vec()
}

/// Absent values sort after present ones no matter the direction; the
/// direction only flips comparisons between two present values.
pub fn compare_optional(
    a: Option<&str>,
    b: Option<&str>,
    descending: bool,
) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let ord = x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase());
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}
