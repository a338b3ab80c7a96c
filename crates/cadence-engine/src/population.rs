//! The demo population: traders that sell to each other over messages.
//!
//! Every trader holds one goal, "sell `target` units". While the goal is
//! unachieved the trader broadcasts an offer at a random price each cycle.
//! A trader whose reservation price covers an offer replies `accept`; the
//! seller books the sale when the acceptance arrives. Once every trader has
//! met its target nobody has work left and the simulation goes quiet.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use cadence_agents::{AgentArguments, AgentView, Plan, PlanContext, run_once, scheme_fn};
use cadence_core::platform::Platform;
use cadence_types::{AgentId, ContextContainer, Goal, GoalHandle, Message, Trigger};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

const OFFER: &str = "offer";
const ACCEPT: &str = "accept";
const PRICE: &str = "price";

/// Population settings, read from the `population` section of
/// `cadence-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PopulationConfig {
    /// Number of traders to spawn.
    #[serde(default = "default_traders")]
    pub traders: u32,

    /// Sales each trader must complete before it goes quiet.
    #[serde(default = "default_sales_target")]
    pub sales_target: u32,

    /// Upper bound for offer and reservation prices.
    #[serde(default = "default_max_price")]
    pub max_price: u32,

    /// Base seed for per-trader price generators.
    #[serde(default)]
    pub seed: u64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            traders: default_traders(),
            sales_target: default_sales_target(),
            max_price: default_max_price(),
            seed: 0,
        }
    }
}

const fn default_traders() -> u32 {
    6
}

const fn default_sales_target() -> u32 {
    3
}

const fn default_max_price() -> u32 {
    100
}

/// What a trader did in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TradeAction {
    /// Broadcast an offer.
    Offered {
        /// Asking price.
        price: u32,
    },
    /// Accepted someone else's offer.
    Bought {
        /// The selling trader.
        seller: AgentId,
        /// Agreed price.
        price: u32,
    },
    /// Booked a sale after an acceptance arrived.
    Sold {
        /// The buying trader.
        buyer: AgentId,
        /// Agreed price.
        price: u32,
    },
}

/// Per-trader state, registered as an agent context.
#[derive(Debug)]
pub struct TraderBook {
    reservation: u32,
    max_price: u32,
    sold: AtomicU32,
    rng: Mutex<StdRng>,
}

impl TraderBook {
    /// A book with a random reservation price drawn from `seed`.
    pub fn new(seed: u64, max_price: u32) -> Self {
        let max_price = max_price.max(1);
        let mut rng = StdRng::seed_from_u64(seed);
        let reservation = rng.random_range(1..=max_price);
        Self {
            reservation,
            max_price,
            sold: AtomicU32::new(0),
            rng: Mutex::new(rng),
        }
    }

    /// Highest price this trader will pay.
    pub const fn reservation(&self) -> u32 {
        self.reservation
    }

    /// Sales booked so far.
    pub fn sold(&self) -> u32 {
        self.sold.load(Ordering::Acquire)
    }

    fn record_sale(&self) {
        self.sold.fetch_add(1, Ordering::AcqRel);
    }

    fn next_price(&self) -> u32 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_range(1..=self.max_price)
    }
}

/// Achieved once the trader's book shows `target` sales.
#[derive(Debug)]
pub struct SalesTarget {
    target: u32,
}

impl SalesTarget {
    /// Goal of selling `target` units.
    pub const fn new(target: u32) -> Self {
        Self { target }
    }
}

impl Goal for SalesTarget {
    fn is_achieved(&self, contexts: &ContextContainer) -> bool {
        contexts
            .get::<TraderBook>()
            .is_some_and(|book| book.sold() >= self.target)
    }
}

fn price_of(message: &Message) -> Option<u32> {
    message.parameter(PRICE)?.parse().ok()
}

fn offer_plan() -> Box<dyn Plan<TradeAction>> {
    run_once(|ctx: &mut PlanContext<'_, TradeAction>| {
        let price = ctx.require_context::<TraderBook>()?.next_price();
        ctx.send(Message::new(ctx.agent_id(), OFFER).with_parameter(PRICE, price.to_string()))?;
        Ok(Some(TradeAction::Offered { price }))
    })
}

fn accept_plan(seller: AgentId, price: u32) -> Box<dyn Plan<TradeAction>> {
    run_once(move |ctx: &mut PlanContext<'_, TradeAction>| {
        ctx.send(
            Message::new(ctx.agent_id(), ACCEPT)
                .to(seller)
                .with_parameter(PRICE, price.to_string()),
        )?;
        Ok(Some(TradeAction::Bought { seller, price }))
    })
}

fn book_sale_plan(buyer: AgentId, price: u32) -> Box<dyn Plan<TradeAction>> {
    run_once(move |ctx: &mut PlanContext<'_, TradeAction>| {
        ctx.require_context::<TraderBook>()?.record_sale();
        Ok(Some(TradeAction::Sold { buyer, price }))
    })
}

fn on_message(trigger: &Trigger, agent: &AgentView<'_>) -> Option<Box<dyn Plan<TradeAction>>> {
    let message = trigger.as_message()?;
    let price = price_of(message)?;
    match message.content.as_str() {
        OFFER => {
            let book = agent.context::<TraderBook>()?;
            (price <= book.reservation()).then(|| accept_plan(message.sender, price))
        }
        ACCEPT => Some(book_sale_plan(message.sender, price)),
        _ => None,
    }
}

/// Arguments for one trader.
pub fn trader(book: TraderBook) -> AgentArguments<TradeAction> {
    AgentArguments::new()
        .add_context(book)
        .add_goal_plan_scheme(scheme_fn(|trigger: &Trigger, _: &AgentView<'_>| {
            trigger.as_goal()?.downcast_ref::<SalesTarget>()?;
            Some(offer_plan())
        }))
        .add_message_plan_scheme(scheme_fn(on_message))
}

/// Spawn the configured traders onto `platform` and give each its goal.
pub fn spawn_traders(config: &PopulationConfig, platform: &Platform<TradeAction>) -> Vec<AgentId> {
    let ids: Vec<AgentId> = (0..config.traders)
        .map(|index| {
            let book = TraderBook::new(config.seed.wrapping_add(u64::from(index)), config.max_price);
            let agent = platform.spawn_agent(trader(book));
            agent.adopt_goal(GoalHandle::new(SalesTarget::new(config.sales_target)));
            agent.id()
        })
        .collect();
    info!(
        traders = ids.len(),
        sales_target = config.sales_target,
        max_price = config.max_price,
        "Traders spawned"
    );
    ids
}
