/// Highest `PRAGMA user_version` this build understands.
pub const SCHEMA_VERSION: i32 = 2;

pub const SCHEMA: &str = r#"
-- Albums: one row per folder below an album root
CREATE TABLE IF NOT EXISTS albums (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    album_root INTEGER NOT NULL,
    relative_path TEXT NOT NULL,
    caption TEXT NOT NULL DEFAULT '',
    collection TEXT NOT NULL DEFAULT '',
    date TEXT,
    icon INTEGER,
    UNIQUE(album_root, relative_path)
);

-- Items: catalogued files
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    album INTEGER NOT NULL REFERENCES albums(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    taken_at TEXT,
    group_leader INTEGER,
    UNIQUE(album, name)
);

CREATE INDEX IF NOT EXISTS idx_items_album ON items(album);
CREATE INDEX IF NOT EXISTS idx_items_group_leader ON items(group_leader);
CREATE INDEX IF NOT EXISTS idx_items_taken_at ON items(taken_at);

-- Tags: taxonomy, pid 0 is the root
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pid INTEGER NOT NULL DEFAULT 0,
    name TEXT NOT NULL,
    icon INTEGER,
    iconkde TEXT,
    UNIQUE(name, pid)
);

CREATE TABLE IF NOT EXISTS item_tags (
    item INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    tag INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (item, tag)
);

CREATE INDEX IF NOT EXISTS idx_item_tags_tag ON item_tags(tag);

-- Saved searches
CREATE TABLE IF NOT EXISTS searches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    query TEXT NOT NULL
);

-- Key-value settings (locale, schema metadata)
CREATE TABLE IF NOT EXISTS settings (
    keyword TEXT PRIMARY KEY,
    value TEXT
);
"#;

/// Column additions for catalogs created by older builds. Failures mean the
/// column already exists and are ignored.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE searches ADD COLUMN temporary INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE albums ADD COLUMN collection TEXT NOT NULL DEFAULT ''",
];
