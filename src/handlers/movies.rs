//! Movie catalogue handlers. All of them require an activated account.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
};
use chrono::{Datelike, Utc};
use serde::Deserialize;

use crate::auth::ActivatedUser;
use crate::http::request::{parse_id, ReadJson};
use crate::http::response::{ApiError, Envelope};
use crate::http::server::AppState;
use crate::store::{with_deadline, MovieFilter, NewMovie, Runtime};
use crate::validation::{permitted, unique, Validator};

const EXPECTED_VERSION: &str = "x-expected-version";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMovie {
    #[serde(default)]
    title: String,
    #[serde(default)]
    year: i32,
    #[serde(default)]
    runtime: Option<Runtime>,
    #[serde(default)]
    genres: Option<Vec<String>>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMovie {
    title: Option<String>,
    year: Option<i32>,
    runtime: Option<Runtime>,
    genres: Option<Vec<String>>,
}

fn validate_movie(
    v: &mut Validator,
    title: &str,
    year: i32,
    runtime: Option<Runtime>,
    genres: Option<&[String]>,
) {
    v.check(!title.is_empty(), "title", "must be provided");
    v.check(title.len() <= 500, "title", "must not be more than 500 bytes long");

    v.check(year != 0, "year", "must be provided");
    v.check(year >= 1888, "year", "must be greater than 1888");
    v.check(year <= Utc::now().year(), "year", "must not be in the future");

    match runtime {
        None | Some(Runtime(0)) => v.add_error("runtime", "must be provided"),
        Some(Runtime(minutes)) => v.check(minutes > 0, "runtime", "must be a positive integer"),
    }

    match genres {
        None => v.add_error("genres", "must be provided"),
        Some(genres) => {
            v.check(!genres.is_empty(), "genres", "must contain at least 1 genre");
            v.check(genres.len() <= 5, "genres", "must not contain more than 5 genres");
            v.check(unique(genres), "genres", "must not contain duplicate values");
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    _user: ActivatedUser,
    ReadJson(input): ReadJson<CreateMovie>,
) -> Result<Envelope, ApiError> {
    let mut v = Validator::new();
    validate_movie(&mut v, &input.title, input.year, input.runtime, input.genres.as_deref());
    v.finish()?;

    let movie = NewMovie {
        title: input.title,
        year: input.year,
        runtime: input.runtime,
        genres: input.genres.unwrap_or_default(),
    };
    let movie = with_deadline(state.store_deadline(), state.movies.insert_movie(movie)).await?;

    let location = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Envelope::new(StatusCode::CREATED)
        .header(header::LOCATION, location)
        .with("movie", &movie)
}

pub async fn show(
    State(state): State<AppState>,
    _user: ActivatedUser,
    Path(id): Path<String>,
) -> Result<Envelope, ApiError> {
    let id = parse_id(&id)?;
    let movie = with_deadline(state.store_deadline(), state.movies.movie_by_id(id))
        .await?
        .ok_or(ApiError::NotFound)?;
    Envelope::new(StatusCode::OK).with("movie", &movie)
}

pub async fn update(
    State(state): State<AppState>,
    _user: ActivatedUser,
    Path(id): Path<String>,
    headers: HeaderMap,
    ReadJson(input): ReadJson<UpdateMovie>,
) -> Result<Envelope, ApiError> {
    let id = parse_id(&id)?;
    let mut movie = with_deadline(state.store_deadline(), state.movies.movie_by_id(id))
        .await?
        .ok_or(ApiError::NotFound)?;

    if let Some(expected) = headers.get(EXPECTED_VERSION) {
        if expected.to_str().ok() != Some(movie.version.to_string().as_str()) {
            return Err(ApiError::EditConflict);
        }
    }

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = Some(runtime);
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie.title, movie.year, movie.runtime, Some(&movie.genres));
    v.finish()?;

    let movie = with_deadline(state.store_deadline(), state.movies.update_movie(movie)).await?;
    Envelope::new(StatusCode::OK).with("movie", &movie)
}

pub async fn delete(
    State(state): State<AppState>,
    _user: ActivatedUser,
    Path(id): Path<String>,
) -> Result<Envelope, ApiError> {
    let id = parse_id(&id)?;
    with_deadline(state.store_deadline(), state.movies.delete_movie(id)).await?;
    Envelope::new(StatusCode::OK).with("message", "movie successfully deleted")
}

fn read_int(query: &HashMap<String, String>, key: &str, default: u32, v: &mut Validator) -> u32 {
    match query.get(key).filter(|s| !s.is_empty()) {
        None => default,
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) => n.clamp(0, u32::MAX as i64) as u32,
            Err(_) => {
                v.add_error(key, "must be an integer value");
                default
            }
        },
    }
}

fn filter_from_query(query: &HashMap<String, String>, v: &mut Validator) -> MovieFilter {
    let defaults = MovieFilter::default();
    let genres = query
        .get("genres")
        .filter(|s| !s.is_empty())
        .map(|s| s.split(',').map(str::to_string).collect())
        .unwrap_or_default();

    MovieFilter {
        title: query.get("title").cloned().unwrap_or_default(),
        genres,
        page: read_int(query, "page", defaults.page, v),
        page_size: read_int(query, "page_size", defaults.page_size, v),
        sort: query.get("sort").cloned().unwrap_or(defaults.sort),
    }
}

fn validate_filter(v: &mut Validator, filter: &MovieFilter) {
    v.check(filter.page > 0, "page", "must be greater than zero");
    v.check(filter.page <= 10_000_000, "page", "must be a maximum of 10 million");
    v.check(filter.page_size > 0, "page_size", "must be greater than zero");
    v.check(filter.page_size <= 100, "page_size", "must be a maximum of 100");
    v.check(
        permitted(&filter.sort.as_str(), &MovieFilter::SORT_SAFELIST),
        "sort",
        "invalid sort value",
    );
}

pub async fn list(
    State(state): State<AppState>,
    _user: ActivatedUser,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Envelope, ApiError> {
    let mut v = Validator::new();
    let filter = filter_from_query(&query, &mut v);
    validate_filter(&mut v, &filter);
    v.finish()?;

    let (movies, metadata) = with_deadline(state.store_deadline(), state.movies.list_movies(&filter)).await?;
    Envelope::new(StatusCode::OK)
        .with("movies", &movies)?
        .with("metadata", &metadata)
}
