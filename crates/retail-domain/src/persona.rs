use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::DomainError;

/// Arquetipo de cliente usado para parametrizar escenarios de entrenamiento.
///
/// `profile`, `scenarios` y `difficulty_mapping` son payloads JSON opacos:
/// su forma interna es convención de la aplicación, el esquema no la valida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub profile: Value,
    pub scenarios: Option<Value>,
    pub difficulty_mapping: Option<Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPersona {
    pub name: String,
    pub description: Option<String>,
    pub profile: Value,
    pub scenarios: Option<Value>,
    pub difficulty_mapping: Option<Value>,
}

impl NewPersona {
    pub fn new(name: &str,
               description: Option<&str>,
               profile: Value,
               scenarios: Option<Value>,
               difficulty_mapping: Option<Value>)
               -> Result<Self, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::ValidationError("persona name must not be empty".to_string()));
        }
        Ok(NewPersona { name: name.to_string(),
                        description: description.map(|d| d.to_string()),
                        profile,
                        scenarios,
                        difficulty_mapping })
    }
}

/// Las tres personas de referencia que toda instalación trae de fábrica.
/// La migración SQL inserta exactamente las mismas filas; el test de dominio
/// fija los nombres para que ambas copias no diverjan en silencio.
pub fn seed_personas() -> Vec<NewPersona> {
    vec![
        NewPersona {
            name: "Bargain Hunter".to_string(),
            description: Some("Price-driven professional who compares every tag against online stores".to_string()),
            profile: json!({
                "age": 32,
                "occupation": "working professional",
                "behavior": "Constantly asks about discounts, compares prices to online stores, and resists upselling",
                "sales_challenge": "Highlight value over price, offer alternatives within budget, prevent churn to competitors"
            }),
            scenarios: Some(json!([
                {
                    "difficulty": "easy",
                    "description": "A customer is looking at a discounted shirt but wants an additional discount",
                    "customer_dialogue": "This shirt is already 30% off, but I saw it cheaper online. Can you match that price?",
                    "challenge": "Price objection handling",
                    "learning_outcome": "Learn to handle price objections while maintaining value proposition"
                },
                {
                    "difficulty": "medium",
                    "description": "Customer wants to negotiate bulk discount for family shopping",
                    "customer_dialogue": "I'm buying for my whole family today. What kind of bulk discount can you offer?",
                    "challenge": "Negotiation and bundle selling",
                    "learning_outcome": "Handle bulk purchase negotiations professionally"
                },
                {
                    "difficulty": "hard",
                    "description": "Aggressive price negotiator threatening to leave",
                    "customer_dialogue": "Your competitor is offering 50% off everything. I'll leave right now unless you can beat that.",
                    "challenge": "Aggressive negotiation tactics",
                    "learning_outcome": "Handle high-pressure situations while protecting margins"
                }
            ])),
            difficulty_mapping: Some(json!({
                "easy": "Single price objection on one item",
                "medium": "Multi-item negotiation with budget pressure",
                "hard": "Competitor comparison with walk-out threat",
                "expert": "Sustained negotiation across the whole basket"
            })),
        },
        NewPersona {
            name: "Overwhelmed Parent".to_string(),
            description: Some("Stressed parent juggling kids who needs safe, practical products fast".to_string()),
            profile: json!({
                "age": 40,
                "occupation": "parent of two",
                "behavior": "Stressed, juggling kids, impatient with long explanations, but needs safe and practical products",
                "sales_challenge": "Simplify options quickly, reassure about product safety and quality, offer convenience"
            }),
            scenarios: Some(json!([
                {
                    "difficulty": "easy",
                    "description": "Parent with crying child needs quick clothing solution",
                    "customer_dialogue": "I need school uniforms for my son quickly. He's getting restless. What do you have in size 8?",
                    "challenge": "Time-pressured service",
                    "learning_outcome": "Provide efficient service under time pressure"
                },
                {
                    "difficulty": "hard",
                    "description": "Frustrated parent with budget constraints and picky children",
                    "customer_dialogue": "My daughter hates everything I pick, my budget is tight, and we need clothes today. This is impossible!",
                    "challenge": "Managing stress and constraints",
                    "learning_outcome": "Handle emotionally charged situations with empathy"
                }
            ])),
            difficulty_mapping: Some(json!({
                "easy": "One urgent need, cooperative customer",
                "medium": "Several children with different needs",
                "hard": "Emotional pressure plus budget constraints",
                "expert": "All of the above under a closing-time deadline"
            })),
        },
        NewPersona {
            name: "Trend-Seeking Influencer".to_string(),
            description: Some("Fashion-conscious student chasing the newest arrivals and premium service".to_string()),
            profile: json!({
                "age": 22,
                "occupation": "college student",
                "behavior": "Wants the newest arrivals, asks for styling tips, posts on social media, expects premium service",
                "sales_challenge": "Stay updated on trends, upsell premium and new arrivals, personalize recommendations"
            }),
            scenarios: Some(json!([
                {
                    "difficulty": "easy",
                    "description": "Young customer looking for an Instagram-worthy outfit",
                    "customer_dialogue": "I need something that will look amazing in photos. What's your most Instagram-worthy piece?",
                    "challenge": "Style consultation",
                    "learning_outcome": "Provide fashion advice and styling suggestions"
                },
                {
                    "difficulty": "expert",
                    "description": "High-maintenance influencer with specific brand requirements",
                    "customer_dialogue": "I only wear sustainable, ethically-made clothes that photograph well under studio lights. What can you show me?",
                    "challenge": "Specific and demanding requirements",
                    "learning_outcome": "Handle complex product specifications and customer demands"
                }
            ])),
            difficulty_mapping: Some(json!({
                "easy": "Single styling request",
                "medium": "Exclusivity expectations on limited stock",
                "hard": "Premium service demands with brand constraints",
                "expert": "Sustainability and exclusivity demands combined"
            })),
        },
    ]
}
