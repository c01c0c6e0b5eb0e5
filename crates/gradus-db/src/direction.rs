use gradus_common::{Error, Phase};

/// How far a single migrate call may travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    Steps(usize),
    All,
}

/// Direction of travel plus the maximum number of steps to traverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up(Span),
    Down(Span),
}

impl Direction {
    pub const UP_ONE: Direction = Direction::Up(Span::Steps(1));
    pub const DOWN_ONE: Direction = Direction::Down(Span::Steps(1));
    pub const UP_ALL: Direction = Direction::Up(Span::All);
    pub const DOWN_ALL: Direction = Direction::Down(Span::All);

    pub fn is_forward(self) -> bool {
        matches!(self, Direction::Up(_))
    }

    pub fn phase(self) -> Phase {
        match self {
            Direction::Up(_) => Phase::Apply,
            Direction::Down(_) => Phase::Revert,
        }
    }

    pub fn span(self) -> Span {
        match self {
            Direction::Up(span) | Direction::Down(span) => span,
        }
    }

    /// Maximum number of steps this direction allows.
    pub fn budget(self) -> usize {
        match self.span() {
            Span::Steps(n) => n,
            Span::All => usize::MAX,
        }
    }

    pub fn is_zero(self) -> bool {
        self.span() == Span::Steps(0)
    }
}

impl TryFrom<i64> for Direction {
    type Error = Error;

    fn try_from(count: i64) -> Result<Self, Self::Error> {
        let steps = usize::try_from(count.unsigned_abs()).unwrap_or(usize::MAX);
        match count {
            0 => Err(Error::InvalidDirection),
            c if c > 0 => Ok(Direction::Up(Span::Steps(steps))),
            _ => Ok(Direction::Down(Span::Steps(steps))),
        }
    }
}
