//! SQL schema definitions.

/// Complete schema for the v1 ledger database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Users & buddies
-- ============================================================

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    telegram_id INTEGER NOT NULL UNIQUE,
    username TEXT UNIQUE,
    display_name TEXT NOT NULL,
    wallet_address TEXT UNIQUE,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- user1_id < user2_id keeps the pair unordered.
CREATE TABLE IF NOT EXISTS buddy_pairs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user1_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    user2_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    initiator_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'active', 'dissolved')),
    created_at INTEGER NOT NULL,
    confirmed_at INTEGER,
    CHECK (user1_id < user2_id),
    CHECK (initiator_id IN (user1_id, user2_id)),
    CHECK (status != 'active' OR confirmed_at IS NOT NULL),
    UNIQUE (user1_id, user2_id)
);

CREATE INDEX IF NOT EXISTS idx_buddy_user1 ON buddy_pairs(user1_id, status);
CREATE INDEX IF NOT EXISTS idx_buddy_user2 ON buddy_pairs(user2_id, status);

-- ============================================================
-- Sightings & wishes
-- ============================================================

CREATE TABLE IF NOT EXISTS corgi_sightings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    reporter_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    buddy_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    corgi_count INTEGER NOT NULL CHECK (corgi_count BETWEEN 1 AND 100),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'confirmed', 'denied')),
    created_at INTEGER NOT NULL,
    responded_at INTEGER,
    CHECK (reporter_id != buddy_id),
    CHECK ((status = 'pending') = (responded_at IS NULL))
);

-- One outstanding sighting per reporter.
CREATE UNIQUE INDEX IF NOT EXISTS idx_sightings_one_pending
    ON corgi_sightings(reporter_id) WHERE status = 'pending';
CREATE INDEX IF NOT EXISTS idx_sightings_buddy ON corgi_sightings(buddy_id, status);

CREATE TABLE IF NOT EXISTS wishes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    creator_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    buddy_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    description TEXT NOT NULL CHECK (length(description) BETWEEN 1 AND 500),
    proposed_amount_cents INTEGER NOT NULL
        CHECK (proposed_amount_cents > 0 AND proposed_amount_cents <= 100000),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'accepted', 'rejected', 'purchased')),
    created_at INTEGER NOT NULL,
    accepted_at INTEGER,
    purchased_at INTEGER,
    purchased_by INTEGER REFERENCES users(id) ON DELETE SET NULL,
    CHECK (purchased_by IS NULL OR purchased_by != creator_id),
    CHECK (status = 'purchased' OR purchased_at IS NULL)
);

CREATE INDEX IF NOT EXISTS idx_wishes_status ON wishes(status);
CREATE INDEX IF NOT EXISTS idx_wishes_creator ON wishes(creator_id);

-- ============================================================
-- Ledger
-- ============================================================

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tx_hash TEXT UNIQUE,
    from_address TEXT NOT NULL,
    to_address TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    tx_type TEXT NOT NULL CHECK (tx_type IN ('reward', 'purchase')),
    related_entity_id INTEGER,
    related_entity_type TEXT CHECK (related_entity_type IN ('sighting', 'wish')),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'completed', 'failed')),
    created_at INTEGER NOT NULL,
    completed_at INTEGER,
    CHECK ((related_entity_id IS NULL) = (related_entity_type IS NULL)),
    CHECK (status != 'completed' OR completed_at IS NOT NULL)
);

-- Exactly-once: at most one non-failed transaction per originating entity.
CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_one_live_per_entity
    ON transactions(related_entity_type, related_entity_id)
    WHERE status != 'failed' AND related_entity_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_transactions_pending
    ON transactions(created_at) WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS pending_rewards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    sighting_id INTEGER NOT NULL REFERENCES corgi_sightings(id) ON DELETE CASCADE,
    amount INTEGER NOT NULL CHECK (amount > 0),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'processed', 'cancelled')),
    created_at INTEGER NOT NULL,
    processed_at INTEGER,
    transaction_id INTEGER REFERENCES transactions(id) ON DELETE SET NULL
);

-- At most one live pending reward per sighting.
CREATE UNIQUE INDEX IF NOT EXISTS idx_pending_rewards_one_per_sighting
    ON pending_rewards(sighting_id) WHERE status != 'cancelled';
CREATE INDEX IF NOT EXISTS idx_pending_rewards_user
    ON pending_rewards(user_id) WHERE status = 'pending';

CREATE TABLE IF NOT EXISTS bank_wallet (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    wallet_address TEXT NOT NULL,
    current_balance INTEGER NOT NULL DEFAULT 0 CHECK (current_balance >= 0),
    total_distributed INTEGER NOT NULL DEFAULT 0 CHECK (total_distributed >= 0),
    last_transaction_hash TEXT,
    updated_at INTEGER NOT NULL
);
"#;
