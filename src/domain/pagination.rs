use serde::Serialize;

/// Validated page-number request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    pub fn parse(page: Option<i64>, limit: Option<i64>) -> Result<Self, &'static str> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);
        if page < 1 {
            return Err("page must be at least 1");
        }
        if !(1..=Self::MAX_LIMIT).contains(&limit) {
            return Err("limit must be between 1 and 100");
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_count: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PageMeta {
    pub fn new(request: PageRequest, total_count: i64) -> Self {
        let total_pages = if total_count <= 0 {
            0
        } else {
            (total_count + request.limit - 1) / request.limit
        };
        Self {
            current_page: request.page,
            total_pages,
            total_count: total_count.max(0),
            has_next_page: request.page < total_pages,
            has_prev_page: request.page > 1,
        }
    }
}
