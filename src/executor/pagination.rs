// ABOUTME: Auto-pagination loop for read actions that declare a `PaginationSpec`
// ABOUTME: Bounded by page/item/time/empty-page safety caps; never loops unboundedly
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Auto-pagination.
//!
//! Invoked when the caller passes `fetch_all_pages: true` against an action that declares
//! a [`PaginationSpec`]. Repeatedly dispatches the prepared call with incrementing
//! page/size query parameters, collecting items from the configured (or conventional)
//! response field, until a safety cap or a natural end-of-data signal is reached.

use super::{dispatch_once, CallResult, PreparedCall};
use crate::constants::pagination as limits;
use crate::db::models::PaginationSpec;
use crate::errors::AppResult;
use serde_json::Value;
use std::time::{Duration, Instant};

const PAGE_TIMEOUT: Duration = Duration::from_secs(60);
const COMMON_LIST_FIELDS: &[&str] = &["content", "items", "data", "results", "records"];

/// Drive the pagination loop described in [`PaginationSpec`] against `prepared`, cloning its
/// query parameters for each page. Always returns `Ok` — mid-loop upstream failures are
/// reported as `{success: false, partial_data}` rather than propagated.
///
/// # Errors
///
/// This function does not itself fail; the `AppResult` wrapper matches the executor's call
/// signature so callers don't need a separate branch for the paginated path.
pub async fn fetch_all_pages(prepared: PreparedCall, spec: &PaginationSpec) -> AppResult<CallResult> {
    let page_size = spec.default_size.min(spec.max_size);
    let start = Instant::now();

    let mut items: Vec<Value> = Vec::new();
    let mut current_page = spec.start_page;
    let mut pages_fetched: u32 = 0;
    let mut consecutive_empty_pages: u32 = 0;

    loop {
        if pages_fetched >= spec.max_pages
            || items.len() >= spec.max_items
            || start.elapsed() >= Duration::from_secs(spec.max_time_seconds)
        {
            break;
        }

        let mut query = prepared.query.clone();
        query.push((spec.page_param.clone(), current_page.to_string()));
        query.push((spec.size_param.clone(), page_size.to_string()));
        let page_call = PreparedCall {
            method: prepared.method,
            url: prepared.url.clone(),
            headers: prepared.headers.clone(),
            query,
            body: prepared.body.clone(),
            body_as_form: prepared.body_as_form,
        };

        let page_result = dispatch_once(page_call, PAGE_TIMEOUT).await;
        let response = match page_result {
            CallResult::Success(value) => value,
            _ => {
                return Ok(CallResult::Success(serde_json::json!({
                    "success": false,
                    "partial_data": items,
                })));
            }
        };

        pages_fetched += 1;
        let new_items = extract_items(&response, spec.data_field.as_deref());

        if new_items.is_empty() {
            consecutive_empty_pages += 1;
        } else {
            consecutive_empty_pages = 0;
        }
        let returned_fewer_than_requested = new_items.len() < page_size;
        items.extend(new_items);

        let last_page = response.get(spec.last_page_field.as_str()).and_then(Value::as_bool).unwrap_or(false);
        let total_pages_reached = response
            .get(spec.total_pages_field.as_str())
            .and_then(Value::as_u64)
            .is_some_and(|total| u64::from(current_page) >= total);

        if last_page
            || total_pages_reached
            || returned_fewer_than_requested
            || consecutive_empty_pages >= limits::DEFAULT_MAX_EMPTY_PAGES
        {
            break;
        }

        current_page += 1;
    }

    Ok(CallResult::Success(serde_json::json!({
        "success": true,
        "data": items,
        "pagination": {
            "total_items": items.len(),
            "pages_fetched": pages_fetched,
            "elapsed_seconds": start.elapsed().as_secs_f64(),
        },
    })))
}

/// Pull the array of items out of one page's response: `data_field` (dot-path) if configured,
/// else the first populated conventional field name, else the response itself if it's
/// already a top-level array.
fn extract_items(response: &Value, data_field: Option<&str>) -> Vec<Value> {
    if let Some(path) = data_field {
        if let Some(Value::Array(items)) = get_nested(response, path) {
            return items.clone();
        }
    }
    for field in COMMON_LIST_FIELDS {
        if let Some(Value::Array(items)) = response.get(*field) {
            return items.clone();
        }
    }
    if let Value::Array(items) = response {
        return items.clone();
    }
    Vec::new()
}

fn get_nested<'a>(value: &'a Value, dot_path: &str) -> Option<&'a Value> {
    dot_path.split('.').try_fold(value, |current, segment| current.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> PaginationSpec {
        PaginationSpec {
            page_param: "page".into(),
            size_param: "pageSize".into(),
            default_size: 2,
            max_size: 2,
            start_page: 1,
            data_field: None,
            total_pages_field: "totalPages".into(),
            last_page_field: "last".into(),
            max_pages: limits::DEFAULT_MAX_PAGES,
            max_items: limits::DEFAULT_MAX_ITEMS,
            max_time_seconds: limits::DEFAULT_MAX_TIME_SECS,
        }
    }

    #[test]
    fn extract_items_prefers_configured_data_field() {
        let s = spec();
        let response = serde_json::json!({ "results": [1, 2], "envelope": { "items": [3] } });
        assert_eq!(extract_items(&response, Some("envelope.items")), vec![Value::from(3)]);
        assert_eq!(extract_items(&response, s.data_field.as_deref()), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn extract_items_falls_back_to_top_level_array() {
        let response = serde_json::json!([1, 2, 3]);
        assert_eq!(extract_items(&response, None).len(), 3);
    }

    #[test]
    fn spec_caps_default_to_the_global_constants_but_are_independently_overridable() {
        let mut s = spec();
        assert_eq!(s.max_pages, limits::DEFAULT_MAX_PAGES);
        s.max_pages = 5;
        assert_eq!(s.max_pages, 5);
        assert_eq!(s.max_items, limits::DEFAULT_MAX_ITEMS);
    }
}
