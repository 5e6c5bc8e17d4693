//! Client-side narrowing of an already loaded page.
//!
//! Nothing here touches the store: filters only see what the current page holds.
use crate::products::{Product, StockLevel};
use crate::sellers::{ApplicationStatus, SellerApplication};
use crate::users::{Role, User};
use serde::Deserialize;
use std::str::FromStr;

pub trait EntityFilter<T> {
    fn matches(&self, item: &T) -> bool;
}

pub fn apply_filters<T: Clone, F: EntityFilter<T>>(items: &[T], filter: &F) -> Vec<T> {
    items
        .iter()
        .filter(|item| filter.matches(item))
        .cloned()
        .collect()
}

/// Lowercased search needle; blank input means "no search".
fn needle(search_text: &Option<String>) -> Option<String> {
    search_text
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

fn any_contains<'a>(fields: impl IntoIterator<Item = Option<&'a str>>, needle: &str) -> bool {
    fields
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductStatusFilter {
    Active,
    Inactive,
    LowStock,
    OutOfStock,
}

impl FromStr for ProductStatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "lowstock" => Ok(Self::LowStock),
            "outofstock" => Ok(Self::OutOfStock),
            other => Err(format!("unknown product status filter: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub search_text: Option<String>,
    pub category: Option<String>,
    pub status: Option<ProductStatusFilter>,
}

impl EntityFilter<Product> for ProductFilter {
    fn matches(&self, product: &Product) -> bool {
        if let Some(needle) = needle(&self.search_text) {
            let fields = [
                Some(product.name.as_str()),
                product.description.as_deref(),
                product.brand.as_deref(),
                product.sku.as_deref(),
            ];
            if !any_contains(fields, &needle) {
                return false;
            }
        }

        if let Some(category) = &self.category {
            let same = product
                .category
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(category));
            if !same {
                return false;
            }
        }

        match self.status {
            None => true,
            Some(ProductStatusFilter::Active) => product.is_active,
            Some(ProductStatusFilter::Inactive) => !product.is_active,
            Some(ProductStatusFilter::LowStock) => product.is_low_stock(),
            Some(ProductStatusFilter::OutOfStock) => {
                product.stock_level() == StockLevel::OutOfStock
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub search_text: Option<String>,
    pub role: Option<Role>,
}

impl EntityFilter<User> for UserFilter {
    fn matches(&self, user: &User) -> bool {
        if let Some(needle) = needle(&self.search_text) {
            let fields = [Some(user.email.as_str()), user.display_name.as_deref()];
            if !any_contains(fields, &needle) {
                return false;
            }
        }
        self.role.map_or(true, |role| user.has_role(role))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SellerFilter {
    pub search_text: Option<String>,
    pub status: Option<ApplicationStatus>,
}

impl EntityFilter<SellerApplication> for SellerFilter {
    fn matches(&self, application: &SellerApplication) -> bool {
        if let Some(needle) = needle(&self.search_text) {
            let fields = [
                Some(application.business_name.as_str()),
                application.first_name.as_deref(),
                application.last_name.as_deref(),
                application.phone_number.as_deref(),
            ];
            if !any_contains(fields, &needle) {
                return false;
            }
        }
        self.status.map_or(true, |s| application.status == s)
    }
}

/// Raw query-string form of the filters, shared by the HTTP listing routes.
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
}

impl FilterParams {
    fn selected(value: &Option<String>) -> Option<&str> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
    }

    pub fn product_filter(&self) -> Result<ProductFilter, String> {
        Ok(ProductFilter {
            search_text: self.search.clone(),
            category: Self::selected(&self.category).map(str::to_string),
            status: Self::selected(&self.status).map(str::parse).transpose()?,
        })
    }

    pub fn user_filter(&self) -> Result<UserFilter, String> {
        Ok(UserFilter {
            search_text: self.search.clone(),
            role: Self::selected(&self.role).map(str::parse).transpose()?,
        })
    }

    pub fn seller_filter(&self) -> Result<SellerFilter, String> {
        Ok(SellerFilter {
            search_text: self.search.clone(),
            status: Self::selected(&self.status).map(str::parse).transpose()?,
        })
    }
}
