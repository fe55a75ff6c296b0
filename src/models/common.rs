use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PaginationQuery {
    /// Page defaults to 1, limit defaults to 20 and is capped at 100.
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(20).clamp(1, 100);
        (page, limit)
    }
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: Some(1),
            limit: Some(20),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: u32,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn from_full_list(items: Vec<T>, page: u32, limit: u32) -> Self {
        let total = items.len() as u32;
        // Widen before multiplying: page is caller-controlled and u32
        // arithmetic would overflow on absurd page numbers.
        let start = (page.max(1) as usize - 1).saturating_mul(limit as usize);
        let data: Vec<T> = items
            .into_iter()
            .skip(start)
            .take(limit as usize)
            .collect();
        Self {
            data,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults_and_caps() {
        let q = PaginationQuery {
            page: None,
            limit: Some(500),
        };
        assert_eq!(q.resolve(), (1, 100));

        let q = PaginationQuery {
            page: Some(0),
            limit: Some(0),
        };
        assert_eq!(q.resolve(), (1, 1));
    }

    #[test]
    fn test_page_far_past_the_end_is_empty() {
        let items: Vec<u32> = (0..45).collect();
        let (page, limit) = PaginationQuery {
            page: Some(u32::MAX),
            limit: Some(100),
        }
        .resolve();
        let result = PaginatedResponse::from_full_list(items, page, limit);
        assert_eq!(result.total, 45);
        assert!(result.data.is_empty());
    }

    #[test]
    fn test_paginated_slicing() {
        let items: Vec<u32> = (0..45).collect();
        let page = PaginatedResponse::from_full_list(items, 3, 20);
        assert_eq!(page.total, 45);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.data, vec![40, 41, 42, 43, 44]);
    }
}
