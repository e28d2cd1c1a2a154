use url::Url;

pub const UNKNOWN_STORE: &str = "Loja Desconhecida";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreDef {
    pub slug: &'static str,
    pub name: &'static str,
    pub domains: &'static [&'static str],
}

pub static STORES: &[StoreDef] = &[
    StoreDef { slug: "amazon", name: "Amazon", domains: &["amazon.com.br", "amazon.com", "amzn.to", "amzn.eu", "a.co"] },
    StoreDef { slug: "mercadolivre", name: "Mercado Livre", domains: &["mercadolivre.com.br", "mercadolivre.com", "mercadolibre.com"] },
    StoreDef { slug: "shopee", name: "Shopee", domains: &["shopee.com.br", "shp.ee"] },
    StoreDef { slug: "aliexpress", name: "AliExpress", domains: &["aliexpress.com", "aliexpress.us"] },
    StoreDef { slug: "magalu", name: "Magazine Luiza", domains: &["magazineluiza.com.br", "magazinevoce.com.br", "magalu.com"] },
    StoreDef { slug: "kabum", name: "KaBuM!", domains: &["kabum.com.br"] },
    StoreDef { slug: "terabyte", name: "Terabyte", domains: &["terabyteshop.com.br"] },
    StoreDef { slug: "pichau", name: "Pichau", domains: &["pichau.com.br"] },
    StoreDef { slug: "casasbahia", name: "Casas Bahia", domains: &["casasbahia.com.br"] },
    StoreDef { slug: "pontofrio", name: "Ponto", domains: &["pontofrio.com.br", "pontofrio.com"] },
    StoreDef { slug: "extra", name: "Extra", domains: &["extra.com.br"] },
    StoreDef { slug: "americanas", name: "Americanas", domains: &["americanas.com.br"] },
    StoreDef { slug: "submarino", name: "Submarino", domains: &["submarino.com.br"] },
    StoreDef { slug: "shoptime", name: "Shoptime", domains: &["shoptime.com.br"] },
    StoreDef { slug: "fastshop", name: "Fast Shop", domains: &["fastshop.com.br"] },
    StoreDef { slug: "samsung", name: "Samsung", domains: &["samsung.com"] },
    StoreDef { slug: "lg", name: "LG", domains: &["lg.com"] },
    StoreDef { slug: "comfy", name: "Comfy", domains: &["comfy.com.br"] },
    StoreDef { slug: "trocafy", name: "Trocafy", domains: &["trocafy.com.br"] },
    StoreDef { slug: "ninja", name: "Ninja", domains: &["ninja.com.br"] },
    StoreDef { slug: "carrefour", name: "Carrefour", domains: &["carrefour.com.br"] },
    StoreDef { slug: "saraiva", name: "Saraiva", domains: &["saraiva.com.br"] },
    StoreDef { slug: "drogasil", name: "Drogasil", domains: &["drogasil.com.br", "drogaraia.com.br"] },
    StoreDef { slug: "meupc", name: "MeuPC.net", domains: &["meupc.net"] },
    StoreDef { slug: "promobit", name: "Promobit", domains: &["promobit.com.br"] },
    StoreDef { slug: "pelando", name: "Pelando", domains: &["pelando.com.br"] },
];

pub fn find_by_slug(slug: &str) -> Option<&'static StoreDef> {
    STORES.iter().find(|store| store.slug == slug)
}

/// Host of `url` lowercased and without `www.`. Scheme-less input is accepted.
pub fn host_of(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let parsed = Url::parse(trimmed)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("https://{}", trimmed)).ok())?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Store owning `host`: exact or subdomain match first, then a label match
/// on the store's first domain label (e.g. `kabum` in `kabum.com.ar`).
pub fn detect_store_by_host(host: &str) -> Option<&'static StoreDef> {
    if let Some(store) = STORES
        .iter()
        .find(|store| store.domains.iter().any(|d| host_matches(host, d)))
    {
        return Some(store);
    }

    let labels: Vec<&str> = host.split(['.', '-']).collect();
    STORES.iter().find(|store| {
        store.domains.iter().any(|d| {
            let first = d.split('.').next().unwrap_or(d);
            first.len() >= 4 && labels.contains(&first)
        })
    })
}

pub fn detect_store(url: &str) -> Option<&'static StoreDef> {
    detect_store_by_host(&host_of(url)?)
}

/// Display name for the store of `url`, `Loja Desconhecida` when unknown.
pub fn store_name(url: &str) -> &'static str {
    detect_store(url).map(|s| s.name).unwrap_or(UNKNOWN_STORE)
}
