pub const SCHEMA: &str = r#"
-- Users are managed by the fronting authentication layer; we keep id + name
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- Subjects are shared topics; the slug is the global identity
CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Repositories
CREATE TABLE IF NOT EXISTS repos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    is_private INTEGER NOT NULL DEFAULT 0,

    -- Fork pointer. Deliberately not a foreign key: 0 means "not a fork".
    is_fork INTEGER NOT NULL DEFAULT 0,
    fork_id INTEGER NOT NULL DEFAULT 0,

    -- 0 means "no subject"
    subject_id INTEGER NOT NULL DEFAULT 0,

    is_empty INTEGER NOT NULL DEFAULT 1,
    num_forks INTEGER NOT NULL DEFAULT 0,
    num_stars INTEGER NOT NULL DEFAULT 0,
    default_branch TEXT NOT NULL DEFAULT 'main',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE(owner_id, name)
);

-- Enabled feature areas per repository
CREATE TABLE IF NOT EXISTS repo_units (
    repo_id INTEGER NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
    unit_type TEXT NOT NULL,
    PRIMARY KEY (repo_id, unit_type)
);

-- Detected licenses per repository
CREATE TABLE IF NOT EXISTS repo_licenses (
    repo_id INTEGER NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
    license TEXT NOT NULL,
    PRIMARY KEY (repo_id, license)
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_repos_owner ON repos(owner_id);
CREATE INDEX IF NOT EXISTS idx_repos_fork ON repos(fork_id);
CREATE INDEX IF NOT EXISTS idx_repos_subject_root ON repos(subject_id, is_fork, is_empty);
CREATE INDEX IF NOT EXISTS idx_repos_owner_subject ON repos(owner_id, subject_id);
"#;
