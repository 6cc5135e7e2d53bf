use crate::encoder::Direction;

// Both channels high: the detent rest position with pull-ups
const REST: u8 = 0b11;

// Movement per (previous << 2 | current) channel state, +1 when A leads B.
// Zero for no change and for impossible double transitions.
const TRANSITIONS: [i8; 16] = [0, -1, 1, 0, 1, 0, 0, -1, -1, 0, 0, 1, 0, 1, -1, 0];

/// Gray-code decoder reporting one tick per detent.
///
/// Transitions are summed while the encoder is between detents and only turned into a
/// tick when it settles back at rest, so contact bounce around a single edge cancels
/// itself out.
#[derive(Debug, Clone)]
pub struct QuadratureDecoder {
    a: bool,
    b: bool,
    state: u8,
    travel: i8,
}

impl QuadratureDecoder {
    pub fn new(a: bool, b: bool) -> Self {
        Self {
            a,
            b,
            state: encode(a, b),
            travel: 0,
        }
    }

    pub fn set_a(&mut self, level: bool) -> Option<Direction> {
        self.a = level;
        self.advance()
    }

    pub fn set_b(&mut self, level: bool) -> Option<Direction> {
        self.b = level;
        self.advance()
    }

    fn advance(&mut self) -> Option<Direction> {
        let next = encode(self.a, self.b);
        let index = ((self.state << 2) | next) as usize;
        self.travel = self.travel.saturating_add(TRANSITIONS[index]);
        self.state = next;

        if next != REST {
            return None;
        }

        let travel = std::mem::take(&mut self.travel);
        match travel {
            t if t >= 2 => Some(Direction::Clockwise),
            t if t <= -2 => Some(Direction::CounterClockwise),
            _ => None,
        }
    }
}

fn encode(a: bool, b: bool) -> u8 {
    (u8::from(a) << 1) | u8::from(b)
}
