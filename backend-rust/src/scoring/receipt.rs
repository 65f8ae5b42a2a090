//! Round receipt assembly: the explainability artifact attached to every
//! verdict — plan values, gate messages and the top scoring drivers.

use super::{ContributionItem, CornerBreakdown, RoundReceipt, Winner};

const TOP_DRIVER_LIMIT: usize = 8;
const WINNER_DRIVER_SHARE: usize = 6;

pub(super) struct ReceiptInput<'a> {
    pub round_number: u32,
    pub winner: Winner,
    pub score: String,
    pub red_breakdown: &'a CornerBreakdown,
    pub blue_breakdown: &'a CornerBreakdown,
    pub delta_plan_a: f64,
    pub delta_plan_b: f64,
    pub delta_plan_c: f64,
    pub plan_b_allowed: bool,
    pub plan_c_allowed: bool,
    pub plan_b_reason: String,
    pub plan_c_reason: String,
    pub red_impact_advantage: bool,
    pub blue_impact_advantage: bool,
    pub impact_advantage_reason: String,
    pub gate_messages: Vec<String>,
    pub contributions: Vec<ContributionItem>,
}

/// Top N scoring contributors, prioritizing the winner's contributions so
/// overlay captions lead with what won the round.
pub(super) fn top_drivers(
    contributions: &[ContributionItem],
    winner: Winner,
    top_n: usize,
) -> Vec<ContributionItem> {
    if contributions.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&ContributionItem> = contributions.iter().collect();
    sorted.sort_by(|a, b| {
        b.points
            .abs()
            .partial_cmp(&a.points.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let winner_corner = match winner {
        Winner::Red => Some(combat_types::Corner::Red),
        Winner::Blue => Some(combat_types::Corner::Blue),
        Winner::Draw => None,
    };

    match winner_corner {
        Some(corner) => {
            let winner_side: Vec<&ContributionItem> =
                sorted.iter().copied().filter(|c| c.corner == corner).collect();
            let loser_side: Vec<&ContributionItem> =
                sorted.iter().copied().filter(|c| c.corner != corner).collect();

            let mut result: Vec<ContributionItem> = winner_side
                .iter()
                .take(WINNER_DRIVER_SHARE.min(winner_side.len()))
                .map(|c| (*c).clone())
                .collect();
            let remaining = top_n.saturating_sub(result.len());
            result.extend(loser_side.iter().take(remaining).map(|c| (*c).clone()));
            result.truncate(top_n);
            result
        }
        None => {
            // Draw: interleave both corners evenly
            let red: Vec<&ContributionItem> = sorted
                .iter()
                .copied()
                .filter(|c| c.corner == combat_types::Corner::Red)
                .collect();
            let blue: Vec<&ContributionItem> = sorted
                .iter()
                .copied()
                .filter(|c| c.corner == combat_types::Corner::Blue)
                .collect();
            let mut result = Vec::new();
            for i in 0..top_n / 2 {
                if let Some(c) = red.get(i) {
                    result.push((*c).clone());
                }
                if let Some(c) = blue.get(i) {
                    result.push((*c).clone());
                }
            }
            result.truncate(top_n);
            result
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub(super) fn generate_receipt(input: ReceiptInput<'_>) -> RoundReceipt {
    let mut drivers = top_drivers(&input.contributions, input.winner, TOP_DRIVER_LIMIT);
    for driver in &mut drivers {
        driver.points = round2(driver.points);
    }

    RoundReceipt {
        round_number: input.round_number,
        winner: input.winner,
        score: input.score,
        red_plan_a: round2(input.red_breakdown.plan_a_total),
        blue_plan_a: round2(input.blue_breakdown.plan_a_total),
        delta_plan_a: round2(input.delta_plan_a),
        plan_b_applied: round2(input.delta_plan_b),
        plan_c_applied: round2(input.delta_plan_c),
        plan_b_allowed: input.plan_b_allowed,
        plan_c_allowed: input.plan_c_allowed,
        plan_b_reason: input.plan_b_reason,
        plan_c_reason: input.plan_c_reason,
        red_has_impact_advantage: input.red_impact_advantage,
        blue_has_impact_advantage: input.blue_impact_advantage,
        impact_advantage_reason: input.impact_advantage_reason,
        top_drivers: drivers,
        gate_messages: input.gate_messages,
        red_breakdown: input.red_breakdown.clone(),
        blue_breakdown: input.blue_breakdown.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use combat_types::Corner;

    fn contribution(id: &str, corner: Corner, points: f64) -> ContributionItem {
        ContributionItem {
            id: id.to_string(),
            corner,
            label: id.to_string(),
            points,
            category: super::super::Category::Striking,
        }
    }

    #[test]
    fn winner_contributions_lead_the_drivers() {
        let mut contributions = Vec::new();
        for i in 0..10 {
            contributions.push(contribution(&format!("red-{i}"), Corner::Red, 5.0 - i as f64 * 0.1));
        }
        for i in 0..10 {
            contributions.push(contribution(&format!("blue-{i}"), Corner::Blue, 9.0 - i as f64 * 0.1));
        }

        let drivers = top_drivers(&contributions, Winner::Red, 8);
        assert_eq!(drivers.len(), 8);
        // Six winner entries first, then the loser's biggest
        assert!(drivers[..6].iter().all(|d| d.corner == Corner::Red));
        assert!(drivers[6..].iter().all(|d| d.corner == Corner::Blue));
        assert!((drivers[6].points - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn draw_interleaves_corners() {
        let contributions = vec![
            contribution("r1", Corner::Red, 3.0),
            contribution("r2", Corner::Red, 2.0),
            contribution("b1", Corner::Blue, 3.0),
            contribution("b2", Corner::Blue, 2.0),
        ];
        let drivers = top_drivers(&contributions, Winner::Draw, 4);
        assert_eq!(drivers.len(), 4);
        assert_eq!(drivers[0].corner, Corner::Red);
        assert_eq!(drivers[1].corner, Corner::Blue);
    }

    #[test]
    fn driver_order_is_deterministic_on_ties() {
        let contributions = vec![
            contribution("b", Corner::Red, 2.0),
            contribution("a", Corner::Red, 2.0),
        ];
        let first = top_drivers(&contributions, Winner::Red, 8);
        let second = top_drivers(&contributions, Winner::Red, 8);
        assert_eq!(first, second);
        assert_eq!(first[0].id, "a");
    }
}
