use uuid::Uuid;

use crate::errors::AppError;
use crate::models::listing::{CreateListingRequest, ListingUpdate, NewListing};
use crate::models::patch::Patch;

pub const MAX_TITLE_LEN: usize = 120;
pub const MAX_DESCRIPTION_LEN: usize = 5000;
const MAX_TAG_LEN: usize = 80;

pub fn validate_new_listing(
    owner_id: Uuid,
    req: CreateListingRequest,
) -> Result<NewListing, AppError> {
    let title = validate_title(&req.title)?;
    let description = validate_description(&req.description)?;
    validate_price(req.price_cents)?;
    Ok(NewListing {
        id: Uuid::new_v4(),
        owner_id,
        title,
        description,
        price_cents: req.price_cents,
        category: optional_text("category", req.category)?,
        location: optional_text("location", req.location)?,
    })
}

pub fn validate_listing_update(update: ListingUpdate) -> Result<ListingUpdate, AppError> {
    if let Some(price) = update.price_cents {
        validate_price(price)?;
    }
    Ok(ListingUpdate {
        title: update.title.as_deref().map(validate_title).transpose()?,
        description: update
            .description
            .as_deref()
            .map(validate_description)
            .transpose()?,
        price_cents: update.price_cents,
        category: patch_text("category", update.category)?,
        location: patch_text("location", update.location)?,
        is_active: update.is_active,
    })
}

fn validate_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

fn validate_description(description: &str) -> Result<String, AppError> {
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(AppError::Validation(format!(
            "Description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(description.to_string())
}

fn validate_price(price_cents: i64) -> Result<(), AppError> {
    if price_cents < 0 {
        return Err(AppError::Validation("Price must not be negative".to_string()));
    }
    Ok(())
}

fn optional_text(field: &str, value: Option<String>) -> Result<Option<String>, AppError> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    check_tag_len(field, value.as_deref())?;
    Ok(value)
}

fn check_tag_len(field: &str, value: Option<&str>) -> Result<(), AppError> {
    if value.is_some_and(|v| v.chars().count() > MAX_TAG_LEN) {
        return Err(AppError::Validation(format!(
            "{field} must be at most {MAX_TAG_LEN} characters"
        )));
    }
    Ok(())
}

fn patch_text(field: &str, value: Patch<String>) -> Result<Patch<String>, AppError> {
    let value = value.trimmed();
    check_tag_len(field, value.as_deref())?;
    Ok(value)
}
