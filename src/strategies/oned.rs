//! 1D strategies: First-Fit-Decreasing and Best-Fit-Decreasing bar packing (§4.2).

use uuid::Uuid;

use super::{Bar, Cut1D, Options1D, Piece1D, Result1D, Statistics, Stock1D, Strategy1D};

struct OpenBar {
    stock_id: Uuid,
    stock_length: f64,
    cuts: Vec<Cut1D>,
    remaining: f64,
}

impl OpenBar {
    fn new(stock_id: Uuid, stock_length: f64) -> Self {
        Self {
            stock_id,
            stock_length,
            cuts: Vec::new(),
            remaining: stock_length,
        }
    }

    fn place(&mut self, piece_id: Uuid, length: f64, kerf: f64) {
        let offset = self.stock_length - self.remaining;
        self.cuts.push(Cut1D {
            piece_id,
            offset,
            length,
        });
        // Kerf is charged after each cut except the last of a bar; since we
        // don't know in advance whether this is the bar's last cut, the
        // charge is applied optimistically here and the final cut's
        // trailing kerf is credited back into waste at finalize time.
        self.remaining -= length + kerf;
    }

    fn finalize(self, kerf: f64, min_usable_waste: f64) -> Bar {
        // The last cut never pays trailing kerf; give that kerf band back.
        let waste = if self.cuts.is_empty() {
            self.remaining
        } else {
            self.remaining + kerf
        };
        let waste_percentage = if self.stock_length > 0.0 {
            (waste / self.stock_length) * 100.0
        } else {
            0.0
        };
        let usable_waste = if crate::geometry::usable_waste(waste, min_usable_waste) {
            waste
        } else {
            0.0
        };

        Bar {
            stock_id: self.stock_id,
            stock_length: self.stock_length,
            cuts: self.cuts,
            waste,
            waste_percentage,
            usable_waste,
        }
    }
}

/// Sorts pieces descending by length, tie-broken by id for determinism.
fn sorted_pieces(pieces: &[Piece1D]) -> Vec<&Piece1D> {
    let mut v: Vec<&Piece1D> = pieces.iter().collect();
    v.sort_by(|a, b| {
        b.length
            .partial_cmp(&a.length)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    v
}

/// Picks the cheapest stock record with remaining availability whose
/// length can fit `piece_length` (+ kerf for the first cut, which needs no
/// leading kerf, so the raw length is the correct fit check).
fn cheapest_fitting_stock<'a>(
    stock: &'a [Stock1D],
    used: &std::collections::HashMap<Uuid, u32>,
    piece_length: f64,
) -> Option<&'a Stock1D> {
    stock
        .iter()
        .filter(|s| s.length >= piece_length)
        .filter(|s| used.get(&s.id).copied().unwrap_or(0) < s.available)
        .min_by(|a, b| {
            a.unit_price
                .partial_cmp(&b.unit_price)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        })
}

fn finalize_all(bars: Vec<OpenBar>, kerf: f64, min_usable_waste: f64) -> Vec<Bar> {
    bars.into_iter()
        .map(|b| b.finalize(kerf, min_usable_waste))
        .collect()
}

pub struct Ffd;

impl Strategy1D for Ffd {
    fn execute(&self, pieces: &[Piece1D], stock: &[Stock1D], options: &Options1D) -> Result1D {
        let ordered = sorted_pieces(pieces);
        let mut open_bars: Vec<OpenBar> = Vec::new();
        let mut used: std::collections::HashMap<Uuid, u32> = std::collections::HashMap::new();
        let mut unplaced = Vec::new();

        'piece: for piece in ordered {
            for bar in open_bars.iter_mut() {
                if bar.remaining >= piece.length + options.kerf {
                    bar.place(piece.id, piece.length, options.kerf);
                    continue 'piece;
                }
            }

            match cheapest_fitting_stock(stock, &used, piece.length) {
                Some(s) => {
                    *used.entry(s.id).or_insert(0) += 1;
                    let mut bar = OpenBar::new(s.id, s.length);
                    bar.place(piece.id, piece.length, options.kerf);
                    open_bars.push(bar);
                }
                None => unplaced.push(piece.id),
            }
        }

        let total_stock_length: f64 = open_bars.iter().map(|b| b.stock_length).sum();
        let bars = finalize_all(open_bars, options.kerf, options.min_usable_waste);
        let total_waste: f64 = bars.iter().map(|b| b.waste).sum();
        let efficiency = if total_stock_length > 0.0 {
            100.0 - (total_waste / total_stock_length) * 100.0
        } else {
            100.0
        };

        Result1D {
            bars,
            unplaced_pieces: unplaced,
            statistics: Statistics { efficiency },
        }
    }
}

pub struct Bfd;

impl Strategy1D for Bfd {
    fn execute(&self, pieces: &[Piece1D], stock: &[Stock1D], options: &Options1D) -> Result1D {
        let ordered = sorted_pieces(pieces);
        let mut open_bars: Vec<OpenBar> = Vec::new();
        let mut used: std::collections::HashMap<Uuid, u32> = std::collections::HashMap::new();
        let mut unplaced = Vec::new();

        for piece in ordered {
            // Tightest fit: minimize remaining length after placement.
            // Tie-break: lower stock id order, then older (earlier-opened) bar.
            let best = open_bars
                .iter_mut()
                .enumerate()
                .filter(|(_, b)| b.remaining >= piece.length + options.kerf)
                .min_by(|(ia, a), (ib, b)| {
                    let rem_a = a.remaining - piece.length - options.kerf;
                    let rem_b = b.remaining - piece.length - options.kerf;
                    rem_a
                        .partial_cmp(&rem_b)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.stock_id.cmp(&b.stock_id))
                        .then_with(|| ia.cmp(ib))
                })
                .map(|(i, _)| i);

            match best {
                Some(i) => open_bars[i].place(piece.id, piece.length, options.kerf),
                None => match cheapest_fitting_stock(stock, &used, piece.length) {
                    Some(s) => {
                        *used.entry(s.id).or_insert(0) += 1;
                        let mut bar = OpenBar::new(s.id, s.length);
                        bar.place(piece.id, piece.length, options.kerf);
                        open_bars.push(bar);
                    }
                    None => unplaced.push(piece.id),
                },
            }
        }

        let total_stock_length: f64 = open_bars.iter().map(|b| b.stock_length).sum();
        let bars = finalize_all(open_bars, options.kerf, options.min_usable_waste);
        let total_waste: f64 = bars.iter().map(|b| b.waste).sum();
        let efficiency = if total_stock_length > 0.0 {
            100.0 - (total_waste / total_stock_length) * 100.0
        } else {
            100.0
        };

        Result1D {
            bars,
            unplaced_pieces: unplaced,
            statistics: Statistics { efficiency },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece(length: f64) -> Piece1D {
        Piece1D {
            id: Uuid::new_v4(),
            order_item_id: Uuid::new_v4(),
            length,
        }
    }

    fn stock(length: f64, available: u32, price: f64) -> Stock1D {
        Stock1D {
            id: Uuid::new_v4(),
            length,
            available,
            unit_price: price,
        }
    }

    #[test]
    fn ffd_packs_three_600mm_pieces_onto_one_2000mm_bar_with_zero_kerf() {
        let pieces = vec![piece(600.0), piece(600.0), piece(600.0)];
        let stock = vec![stock(2000.0, 10, 10.0)];
        let options = Options1D {
            kerf: 0.0,
            min_usable_waste: 50.0,
        };

        let result = Ffd.execute(&pieces, &stock, &options);

        assert_eq!(result.bars.len(), 1);
        assert!(result.unplaced_pieces.is_empty());
        let bar = &result.bars[0];
        let offsets: Vec<f64> = bar.cuts.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0.0, 600.0, 1200.0]);
        assert_eq!(bar.waste, 200.0);
    }

    #[test]
    fn ffd_overflow_demand_opens_a_second_bar() {
        // Demand 3x600 + 2x400 = 2600mm exceeds a single 2000mm bar.
        let pieces = vec![
            piece(600.0),
            piece(600.0),
            piece(600.0),
            piece(400.0),
            piece(400.0),
        ];
        let stock = vec![stock(2000.0, 10, 10.0)];
        let options = Options1D {
            kerf: 0.0,
            min_usable_waste: 50.0,
        };

        let result = Ffd.execute(&pieces, &stock, &options);

        assert_eq!(result.bars.len(), 2);
        assert!(result.unplaced_pieces.is_empty());
        assert_eq!(result.bars[0].waste, 200.0);
        assert_eq!(result.bars[1].waste, 1200.0);
    }

    #[test]
    fn ffd_applies_kerf_between_cuts_not_after_the_last() {
        let pieces = vec![piece(600.0), piece(600.0), piece(600.0)];
        let stock = vec![stock(2000.0, 10, 10.0)];
        let options = Options1D {
            kerf: 3.0,
            min_usable_waste: 50.0,
        };

        let result = Ffd.execute(&pieces, &stock, &options);
        let bar = &result.bars[0];
        let offsets: Vec<f64> = bar.cuts.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0.0, 603.0, 1206.0]);
        assert_eq!(bar.waste, 2000.0 - 1800.0 - 3.0 * 2.0);
    }

    #[test]
    fn bfd_prefers_tightest_fit_over_insertion_order() {
        // pieces {A:1000,1},{B:800,1},{C:200,1}; stock {S1:1200,1},{S2:1000,1}
        let a = piece(1000.0);
        let b = piece(800.0);
        let c = piece(200.0);
        let s1 = stock(1200.0, 1, 5.0);
        let s2 = stock(1000.0, 1, 5.0);

        let result = Bfd.execute(
            &[a, b, c],
            &[s1, s2],
            &Options1D {
                kerf: 0.0,
                min_usable_waste: 50.0,
            },
        );

        assert!(result.unplaced_pieces.is_empty());
        assert_eq!(result.bars.len(), 2);
        let total_waste: f64 = result.bars.iter().map(|bar| bar.waste).sum();
        assert_eq!(total_waste, 200.0);
    }

    #[test]
    fn piece_longer_than_every_stock_is_left_unplaced() {
        let pieces = vec![piece(5000.0)];
        let stock = vec![stock(2000.0, 10, 10.0)];
        let options = Options1D {
            kerf: 0.0,
            min_usable_waste: 50.0,
        };

        let result = Ffd.execute(&pieces, &stock, &options);
        assert_eq!(result.unplaced_pieces, vec![pieces[0].id]);
        assert!(result.bars.is_empty());
    }

    #[test]
    fn zero_pieces_yields_empty_success() {
        let stock = vec![stock(2000.0, 10, 10.0)];
        let options = Options1D {
            kerf: 0.0,
            min_usable_waste: 50.0,
        };
        let result = Ffd.execute(&[], &stock, &options);
        assert!(result.bars.is_empty());
        assert!(result.unplaced_pieces.is_empty());
    }
}
