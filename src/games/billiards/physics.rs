//! Fixed-timestep table simulation.
//!
//! Runs server-side only; clients just render the replicated positions.
//! Given the same initial positions and velocities the step sequence is
//! reproducible: fixed tick, fixed iteration order, no randomness.

use serde::{Deserialize, Serialize};

pub const TABLE_WIDTH: f32 = 800.0;
pub const TABLE_HEIGHT: f32 = 400.0;
pub const BALL_RADIUS: f32 = 10.0;
/// Larger than the ball radius: the overhang is the capture tolerance
/// around each pocket center.
pub const POCKET_RADIUS: f32 = 14.0;
/// Four corners plus the two long-rail midpoints.
pub const POCKETS: [(f32, f32); 6] = [
    (0.0, 0.0),
    (400.0, 0.0),
    (800.0, 0.0),
    (0.0, 400.0),
    (400.0, 400.0),
    (800.0, 400.0),
];
/// Per-tick velocity retention (rolling drag).
pub const DRAG: f32 = 0.985;
/// Energy kept on cushion and ball impacts.
pub const RESTITUTION: f32 = 0.92;
/// Below this speed a ball is considered at rest.
pub const STOP_THRESHOLD: f32 = 0.05;

pub const CUE_ID: u8 = 0;
pub const BLACK_ID: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BallKind {
    Cue,
    Solid,
    Stripe,
    Black,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ball {
    pub id: u8,
    pub kind: BallKind,
    pub x: f32,
    pub y: f32,
    #[serde(skip)]
    pub vx: f32,
    #[serde(skip)]
    pub vy: f32,
    /// False once pocketed; the ball stays in the vec for scorekeeping and
    /// reset but is skipped by every physics check.
    pub visible: bool,
}

impl Ball {
    fn new(id: u8, kind: BallKind, x: f32, y: f32) -> Self {
        Self { id, kind, x, y, vx: 0.0, vy: 0.0, visible: true }
    }

    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct StepOutcome {
    pub pocketed: Vec<u8>,
    pub all_stopped: bool,
}

// Triangle fill order: solids and stripes interleaved, black at the center
// of the third row.
const RACK_ORDER: [(u8, BallKind); 15] = [
    (1, BallKind::Solid),
    (9, BallKind::Stripe),
    (2, BallKind::Solid),
    (3, BallKind::Solid),
    (8, BallKind::Black),
    (10, BallKind::Stripe),
    (11, BallKind::Stripe),
    (4, BallKind::Solid),
    (13, BallKind::Stripe),
    (5, BallKind::Solid),
    (14, BallKind::Stripe),
    (6, BallKind::Solid),
    (15, BallKind::Stripe),
    (7, BallKind::Solid),
    (12, BallKind::Stripe),
];

/// Fresh table: cue on the left spot, fixed triangle at the foot spot.
pub fn rack() -> Vec<Ball> {
    let mut balls = Vec::with_capacity(16);
    balls.push(Ball::new(CUE_ID, BallKind::Cue, 200.0, TABLE_HEIGHT / 2.0));
    let spacing = BALL_RADIUS * 2.0 + 0.5;
    let apex_x = 600.0;
    let mut next = RACK_ORDER.iter();
    for row in 0..5u32 {
        for col in 0..=row {
            if let Some(&(id, kind)) = next.next() {
                let x = apex_x + row as f32 * spacing * 0.866;
                let y = TABLE_HEIGHT / 2.0 + (col as f32 - row as f32 / 2.0) * spacing;
                balls.push(Ball::new(id, kind, x, y));
            }
        }
    }
    balls
}

/// Advance the table by one tick: integrate, drag, pocket capture, cushions,
/// then ball-ball impacts.
///
/// Capture runs on the raw post-integration position, before cushions clamp
/// it back inside the rails; a corner pocket is otherwise unreachable (the
/// clamped corner sits 14.14 units from the pocket center).
pub fn step(balls: &mut [Ball]) -> StepOutcome {
    for b in balls.iter_mut() {
        if !b.visible {
            continue;
        }
        b.x += b.vx;
        b.y += b.vy;
        b.vx *= DRAG;
        b.vy *= DRAG;
        if b.speed() < STOP_THRESHOLD {
            b.vx = 0.0;
            b.vy = 0.0;
        }
    }

    let mut pocketed = Vec::new();
    for b in balls.iter_mut() {
        if !b.visible {
            continue;
        }
        for (px, py) in POCKETS {
            let dx = b.x - px;
            let dy = b.y - py;
            if (dx * dx + dy * dy).sqrt() <= POCKET_RADIUS {
                b.visible = false;
                b.vx = 0.0;
                b.vy = 0.0;
                pocketed.push(b.id);
                break;
            }
        }
    }

    for b in balls.iter_mut() {
        if !b.visible {
            continue;
        }
        if b.x < BALL_RADIUS {
            b.x = BALL_RADIUS;
            b.vx = -b.vx * RESTITUTION;
        }
        if b.x > TABLE_WIDTH - BALL_RADIUS {
            b.x = TABLE_WIDTH - BALL_RADIUS;
            b.vx = -b.vx * RESTITUTION;
        }
        if b.y < BALL_RADIUS {
            b.y = BALL_RADIUS;
            b.vy = -b.vy * RESTITUTION;
        }
        if b.y > TABLE_HEIGHT - BALL_RADIUS {
            b.y = TABLE_HEIGHT - BALL_RADIUS;
            b.vy = -b.vy * RESTITUTION;
        }
    }

    // fixed pair order keeps the outcome reproducible
    for i in 0..balls.len() {
        for j in (i + 1)..balls.len() {
            let (head, tail) = balls.split_at_mut(j);
            let a = &mut head[i];
            let b = &mut tail[0];
            if !a.visible || !b.visible {
                continue;
            }
            collide(a, b);
        }
    }

    let all_stopped = balls
        .iter()
        .filter(|b| b.visible)
        .all(|b| b.vx == 0.0 && b.vy == 0.0);

    StepOutcome { pocketed, all_stopped }
}

fn collide(a: &mut Ball, b: &mut Ball) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist >= BALL_RADIUS * 2.0 {
        return;
    }
    // coincident centers: just push apart along x
    if dist < f32::EPSILON {
        a.x -= BALL_RADIUS;
        b.x += BALL_RADIUS;
        return;
    }
    let nx = dx / dist;
    let ny = dy / dist;

    let overlap = BALL_RADIUS * 2.0 - dist;
    a.x -= nx * overlap / 2.0;
    a.y -= ny * overlap / 2.0;
    b.x += nx * overlap / 2.0;
    b.y += ny * overlap / 2.0;

    // equal masses: exchange the normal velocity components
    let van = a.vx * nx + a.vy * ny;
    let vbn = b.vx * nx + b.vy * ny;
    if van - vbn <= 0.0 {
        // already separating
        return;
    }
    let impulse = (van - vbn) * RESTITUTION;
    a.vx -= impulse * nx;
    a.vy -= impulse * ny;
    b.vx += impulse * nx;
    b.vy += impulse * ny;
}
