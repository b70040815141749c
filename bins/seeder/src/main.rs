//! Database seeder for Libris development and testing.
//!
//! Seeds an admin account, an approved member, and a small catalog so a
//! fresh database is immediately usable.
//!
//! Usage: cargo run --bin seeder

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use libris_core::auth::hash_password;
use libris_db::entities::{
    books,
    sea_orm_active_enums::{AccountStatus, UserRole},
    users,
};

/// Seed admin ID (consistent for all seeds)
const ADMIN_ID: &str = "00000000-0000-0000-0000-000000000001";
/// Seed member ID (consistent for all seeds)
const MEMBER_ID: &str = "00000000-0000-0000-0000-000000000002";

/// Password both seed accounts start with.
const SEED_PASSWORD: &str = "libris-dev";

/// One catalog entry. Fixed IDs keep reruns idempotent.
struct SeedBook {
    id: &'static str,
    title: &'static str,
    author: &'static str,
    genre: &'static str,
    rating: i32,
    cover_color: &'static str,
    description: &'static str,
    summary: &'static str,
    copies: i32,
}

/// Sample catalog.
const BOOKS: &[SeedBook] = &[
    SeedBook {
        id: "00000000-0000-0000-0000-000000000101",
        title: "Dune",
        author: "Frank Herbert",
        genre: "Science Fiction",
        rating: 5,
        cover_color: "#d4a27a",
        description: "Politics, prophecy, and spice on the desert planet Arrakis.",
        summary: "Paul Atreides inherits a desert world, its dangers, and a destiny he never asked for.",
        copies: 3,
    },
    SeedBook {
        id: "00000000-0000-0000-0000-000000000102",
        title: "The Left Hand of Darkness",
        author: "Ursula K. Le Guin",
        genre: "Science Fiction",
        rating: 5,
        cover_color: "#274156",
        description: "An envoy alone on a planet where gender is mutable.",
        summary: "Genly Ai learns that diplomacy on Gethen means crossing the ice with a stranger.",
        copies: 2,
    },
    SeedBook {
        id: "00000000-0000-0000-0000-000000000103",
        title: "Pride and Prejudice",
        author: "Jane Austen",
        genre: "Classic",
        rating: 4,
        cover_color: "#7d5a44",
        description: "Manners, marriage, and misjudgment in Regency England.",
        summary: "Elizabeth Bennet and Mr Darcy revise their first impressions, reluctantly.",
        copies: 4,
    },
    SeedBook {
        id: "00000000-0000-0000-0000-000000000104",
        title: "The Name of the Rose",
        author: "Umberto Eco",
        genre: "Mystery",
        rating: 4,
        cover_color: "#3b2f2f",
        description: "A murder investigation in a fourteenth-century abbey library.",
        summary: "Brother William follows a trail of dead monks into a labyrinth of forbidden books.",
        copies: 2,
    },
    SeedBook {
        id: "00000000-0000-0000-0000-000000000105",
        title: "Thinking, Fast and Slow",
        author: "Daniel Kahneman",
        genre: "Nonfiction",
        rating: 4,
        cover_color: "#e8e3d8",
        description: "Two systems of thought and the biases between them.",
        summary: "Why the quick answer feels right and the slow one usually is.",
        copies: 3,
    },
    SeedBook {
        id: "00000000-0000-0000-0000-000000000106",
        title: "The Hobbit",
        author: "J. R. R. Tolkien",
        genre: "Fantasy",
        rating: 5,
        cover_color: "#2e5339",
        description: "There and back again, with a dragon in the middle.",
        summary: "Bilbo Baggins leaves his pantry behind and comes home with a ring.",
        copies: 5,
    },
    SeedBook {
        id: "00000000-0000-0000-0000-000000000107",
        title: "Invisible Cities",
        author: "Italo Calvino",
        genre: "Fiction",
        rating: 4,
        cover_color: "#b8860b",
        description: "Marco Polo describes cities that may all be one city.",
        summary: "Fifty-five cities, one emperor, and the suspicion they are all Venice.",
        copies: 1,
    },
    SeedBook {
        id: "00000000-0000-0000-0000-000000000108",
        title: "A Brief History of Time",
        author: "Stephen Hawking",
        genre: "Science",
        rating: 4,
        cover_color: "#0b1d3a",
        description: "From the big bang to black holes, without the equations.",
        summary: "The universe from first tick to final horizon, in plain language.",
        copies: 2,
    },
];

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set in environment");

    println!("Connecting to database...");
    let db = libris_db::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    println!("Seeding accounts...");
    seed_accounts(&db).await;

    println!("Seeding catalog...");
    seed_books(&db).await;

    println!("Seeding complete!");
    println!("  admin:  admin@libris.dev / {SEED_PASSWORD}");
    println!("  member: reader@libris.dev / {SEED_PASSWORD}");
}

fn admin_id() -> Uuid {
    Uuid::parse_str(ADMIN_ID).unwrap()
}

fn member_id() -> Uuid {
    Uuid::parse_str(MEMBER_ID).unwrap()
}

/// Seeds the admin and one approved member.
async fn seed_accounts(db: &DatabaseConnection) {
    let accounts = [
        (admin_id(), "admin@libris.dev", "Libris Admin", UserRole::Admin),
        (member_id(), "reader@libris.dev", "Sample Reader", UserRole::User),
    ];

    for (id, email, full_name, role) in accounts {
        if users::Entity::find_by_id(id)
            .one(db)
            .await
            .ok()
            .flatten()
            .is_some()
        {
            println!("  {email} already exists, skipping...");
            continue;
        }

        let password_hash = hash_password(SEED_PASSWORD).expect("Failed to hash seed password");
        let user = users::ActiveModel {
            id: Set(id),
            email: Set(email.to_string()),
            password_hash: Set(password_hash),
            full_name: Set(full_name.to_string()),
            role: Set(role),
            status: Set(AccountStatus::Approved),
            last_activity_at: Set(None),
            created_at: Set(Utc::now().into()),
            updated_at: Set(Utc::now().into()),
        };

        if let Err(e) = user.insert(db).await {
            eprintln!("Failed to insert {email}: {e}");
        } else {
            println!("  Created {email}");
        }
    }
}

/// Seeds the sample catalog.
async fn seed_books(db: &DatabaseConnection) {
    let mut inserted = 0;

    for book in BOOKS {
        let id = Uuid::parse_str(book.id).unwrap();

        if books::Entity::find_by_id(id)
            .one(db)
            .await
            .ok()
            .flatten()
            .is_some()
        {
            continue;
        }

        let row = books::ActiveModel {
            id: Set(id),
            title: Set(book.title.to_string()),
            author: Set(book.author.to_string()),
            genre: Set(book.genre.to_string()),
            rating: Set(book.rating),
            description: Set(book.description.to_string()),
            summary: Set(book.summary.to_string()),
            cover_url: Set(None),
            cover_color: Set(Some(book.cover_color.to_string())),
            total_copies: Set(book.copies),
            available_copies: Set(book.copies),
            created_at: Set(Utc::now().into()),
            updated_at: Set(Utc::now().into()),
        };

        if let Err(e) = row.insert(db).await {
            eprintln!("Failed to insert book {}: {e}", book.title);
        } else {
            inserted += 1;
        }
    }

    println!("  Inserted {inserted} books");
}
