//! Build a discover request from command-line filters, fetch it, and print the parsed movies.
//! Usage:
//!   cargo run --bin discover_props -- [--cert <name>] [--genre <id>] [--year <yyyy>] [--sort <key>]
//!   cargo run --bin discover_props -- --lists
//! Requires TMDB_API_KEY in the environment (.env supported). TMDB_BASE_URL overrides the API root.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use popmovies::models::FilterCriteria;
use popmovies::tmdb::{
    parse_certifications, parse_genres, parse_movies, HttpRemote, QueryBuilder, RemoteApi,
    DEFAULT_BASE,
};
use serde_json::json;
use std::env;

fn usage() -> ! {
    eprintln!(
        "Usage: cargo run --bin discover_props -- [--cert <name>] [--genre <id>] [--year <yyyy>] [--sort <key>]"
    );
    eprintln!("       cargo run --bin discover_props -- --lists");
    std::process::exit(1);
}

fn criteria_from_args(args: &[String]) -> Result<FilterCriteria> {
    let mut criteria = FilterCriteria::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("{} needs a value", flag))
        };
        match flag.as_str() {
            "--cert" => criteria.certification_name = value()?,
            "--genre" => {
                criteria.genre_id = value()?.parse().context("genre must be an integer")?
            }
            "--year" => {
                criteria.release_year = value()?;
                criteria.restrict_to_year = true;
            }
            "--sort" => criteria.sort_key = value()?,
            _ => usage(),
        }
    }
    criteria.validate().map_err(anyhow::Error::msg)?;
    Ok(criteria)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args: Vec<String> = env::args().skip(1).collect();

    let api_key = env::var("TMDB_API_KEY").context("TMDB_API_KEY not set")?;
    let base = env::var("TMDB_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE.to_string());
    let queries = QueryBuilder::new(base, api_key);
    let remote = HttpRemote::new()?;

    if args.first().map(String::as_str) == Some("--lists") {
        let genres = parse_genres(&remote.get(&queries.genre_list().to_url()).await?)?;
        let certs =
            parse_certifications(&remote.get(&queries.certification_list().to_url()).await?)?;
        let output = json!({ "genres": genres, "certifications": certs });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let criteria = criteria_from_args(&args)?;
    let request = queries.build(&criteria);
    let movies = parse_movies(&remote.get(&request.to_url()).await?)?;

    let output = json!({
        "url": request.redacted_url(),
        "criteria": criteria,
        "count": movies.len(),
        "movies": movies
            .iter()
            .map(|m| json!({
                "id": m.id,
                "title": m.title,
                "year": m.release_year(),
                "vote_average": m.vote_average,
                "vote_count": m.vote_count,
                "poster": m.poster_url(),
            }))
            .collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
